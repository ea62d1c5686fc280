//! Edit generation and the bounded generate → apply → retry loop.

use async_trait::async_trait;
use chrono::Utc;
use patchloop_core::error::FsError;
use patchloop_core::event::{DomainEvent, EventBus};
use patchloop_core::fs::Filesystem;
use patchloop_core::message::Turn;
use patchloop_core::model::{Model, ModelRequest};
use patchloop_telemetry::{ModelRole, TokenTracker};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::cache::FileCache;
use crate::diff::{EditInstruction, apply_edits, generate_diff, parse_search_replace_blocks};

/// Everything the edit generator sees for one round.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub path: String,
    pub current_content: String,
    pub instructions: String,
    pub project_context: String,
    /// Other cached files as (path, content)
    pub other_files: Vec<(String, String)>,
}

/// Turns an edit request into concrete search/replace edits.
///
/// Never fails: a generator that cannot produce edits returns an empty list.
#[async_trait]
pub trait EditGenerator: Send + Sync {
    async fn generate_edit_instructions(&self, request: &EditRequest) -> Vec<EditInstruction>;

    /// Forget any state carried between requests.
    fn reset(&self) {}
}

const EDITOR_SYSTEM_PROMPT: &str = "You are a code editing assistant. You receive a file, the \
user's editing instructions and some project context. Reply ONLY with search/replace blocks:\n\n\
<SEARCH>\nexact lines from the current file\n</SEARCH>\n<REPLACE>\nthe new lines\n</REPLACE>\n\n\
Rules:\n\
- SEARCH text must appear verbatim in the current file, including indentation.\n\
- Keep each SEARCH block small but unique; include just enough surrounding lines.\n\
- Use several blocks for several changes, in file order.\n\
- An empty REPLACE deletes the SEARCH text.\n\
- If no change is needed, reply with no blocks at all.";

/// [`EditGenerator`] backed by the model in text-only mode.
///
/// Keeps a bounded memory of its recent replies which is shown to the model
/// on later requests, so successive edits of the same session stay coherent.
pub struct ModelEditGenerator {
    model: Arc<dyn Model>,
    tracker: Arc<TokenTracker>,
    memory: Mutex<VecDeque<String>>,
    memory_limit: usize,
}

impl ModelEditGenerator {
    pub fn new(model: Arc<dyn Model>, tracker: Arc<TokenTracker>, memory_limit: usize) -> Self {
        Self {
            model,
            tracker,
            memory: Mutex::new(VecDeque::new()),
            memory_limit,
        }
    }

    /// Number of remembered replies.
    pub fn memory_len(&self) -> usize {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn remember(&self, entry: String) {
        if self.memory_limit == 0 {
            return;
        }
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        memory.push_back(entry);
        while memory.len() > self.memory_limit {
            memory.pop_front();
        }
    }

    fn render_prompt(&self, request: &EditRequest) -> String {
        let mut prompt = String::new();

        if !request.project_context.trim().is_empty() {
            let _ = writeln!(prompt, "## Project context\n{}\n", request.project_context.trim());
        }

        if !request.other_files.is_empty() {
            prompt.push_str("## Other files\n");
            for (path, content) in &request.other_files {
                let _ = writeln!(prompt, "### {path}\n```\n{content}\n```");
            }
            prompt.push('\n');
        }

        {
            let memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
            if !memory.is_empty() {
                prompt.push_str("## Previous edits\n");
                for entry in memory.iter() {
                    let _ = writeln!(prompt, "{entry}\n");
                }
            }
        }

        let _ = writeln!(
            prompt,
            "## File: {}\n```\n{}\n```\n\n## Instructions\n{}",
            request.path, request.current_content, request.instructions
        );
        prompt
    }
}

#[async_trait]
impl EditGenerator for ModelEditGenerator {
    async fn generate_edit_instructions(&self, request: &EditRequest) -> Vec<EditInstruction> {
        let prompt = self.render_prompt(request);
        let model_request = ModelRequest::text_only(EDITOR_SYSTEM_PROMPT, vec![Turn::user(prompt)]);

        let response = match self.model.generate(model_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %request.path, error = %e, "Edit generation failed");
                return Vec::new();
            }
        };
        self.tracker.record(
            ModelRole::CodeEditor,
            response.usage.prompt_count,
            response.usage.candidate_count,
        );

        let reply = response.joined_text();
        let edits = parse_search_replace_blocks(&reply);
        debug!(path = %request.path, edits = edits.len(), "Parsed edit instructions");
        if !edits.is_empty() {
            self.remember(format!("Edit instructions for {}:\n{}", request.path, reply.trim()));
        }
        edits
    }

    fn reset(&self) {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Terminal result of [`FileEditor::edit_and_apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStatus {
    /// Every proposed edit matched; the file was written.
    Applied { diff: String, rounds: u32 },
    /// The generator proposed nothing that changes the file.
    NoChangesSuggested,
    /// Some edits never matched within the retry budget. Edits that did
    /// match were still written; `diff` describes them.
    ExhaustedRetries {
        failed: Vec<String>,
        diff: Option<String>,
        rounds: u32,
    },
}

/// Drives edit generation and application for one file at a time.
pub struct FileEditor {
    fs: Arc<dyn Filesystem>,
    cache: Arc<FileCache>,
    generator: Arc<dyn EditGenerator>,
    events: Option<Arc<EventBus>>,
}

impl FileEditor {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        cache: Arc<FileCache>,
        generator: Arc<dyn EditGenerator>,
    ) -> Self {
        Self {
            fs,
            cache,
            generator,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn generator(&self) -> &Arc<dyn EditGenerator> {
        &self.generator
    }

    /// Generate and apply edits to `path` in at most `max_retries` rounds.
    ///
    /// The file is loaded through the cache (read from storage on a miss).
    /// Rounds after the first resend the full instructions with a note
    /// listing the search blocks that failed, against the partially edited
    /// content. Any change is written back and cached.
    pub async fn edit_and_apply(
        &self,
        path: &Path,
        instructions: &str,
        project_context: &str,
        max_retries: u32,
    ) -> Result<EditStatus, FsError> {
        let shown = path.display().to_string();
        let original = self.cache.load(self.fs.as_ref(), path).await?;
        let max_retries = max_retries.max(1);

        let other_files: Vec<(String, String)> = self
            .cache
            .entries()
            .into_iter()
            .filter(|(p, _)| p != path)
            .map(|(p, c)| (p.display().to_string(), c))
            .collect();

        let mut content = original.clone();
        let mut prompt = instructions.to_string();
        let mut failed = Vec::new();

        for round in 1..=max_retries {
            let request = EditRequest {
                path: shown.clone(),
                current_content: content.clone(),
                instructions: prompt.clone(),
                project_context: project_context.to_string(),
                other_files: other_files.clone(),
            };
            let edits = self.generator.generate_edit_instructions(&request).await;

            if edits.is_empty() {
                debug!(path = %shown, round, "Generator proposed no edits");
                return self.finish(path, &original, &content, round).await;
            }

            let report = apply_edits(&shown, &edits, &content);
            info!(
                path = %shown,
                round,
                edits = edits.len(),
                failed = report.failed.len(),
                "Applied edit round"
            );
            self.publish(&shown, report.diffs.join("\n"), report.failed.len());
            content = report.content;

            if report.failed.is_empty() {
                return self.finish(path, &original, &content, round).await;
            }

            failed = report.failed;
            prompt = retry_prompt(instructions, &failed);
        }

        warn!(path = %shown, failed = failed.len(), "Edit retries exhausted");
        let diff = if content != original {
            Some(self.commit(path, &original, &content).await?)
        } else {
            None
        };
        Ok(EditStatus::ExhaustedRetries {
            failed,
            diff,
            rounds: max_retries,
        })
    }

    async fn finish(
        &self,
        path: &Path,
        original: &str,
        content: &str,
        rounds: u32,
    ) -> Result<EditStatus, FsError> {
        if content == original {
            return Ok(EditStatus::NoChangesSuggested);
        }
        let diff = self.commit(path, original, content).await?;
        Ok(EditStatus::Applied { diff, rounds })
    }

    async fn commit(&self, path: &Path, original: &str, content: &str) -> Result<String, FsError> {
        self.fs.write(path, content).await?;
        self.cache.insert(path, content);
        Ok(generate_diff(original, content, &path.display().to_string()))
    }

    fn publish(&self, path: &str, diff: String, failed_edits: usize) {
        if let Some(events) = &self.events {
            events.publish(DomainEvent::EditApplied {
                path: path.to_string(),
                diff,
                failed_edits,
                timestamp: Utc::now(),
            });
        }
    }
}

fn retry_prompt(instructions: &str, failed: &[String]) -> String {
    let mut prompt = format!(
        "{instructions}\n\nSome SEARCH blocks from the previous attempt did not match the file. \
         The file shown above already contains the edits that did apply. \
         Provide corrected blocks for these only, copying the SEARCH text exactly from the file:\n"
    );
    for search in failed {
        let _ = writeln!(prompt, "<SEARCH>\n{search}\n</SEARCH>");
    }
    prompt
}
