//! `patchloop chat` — Interactive or single-message session.

use anyhow::Context;
use patchloop_agent::{
    AutomodeOutcome, ImageAttachment, InterruptFlag, Orchestrator, Runtime, TurnOutput,
    build_runtime,
};
use patchloop_config::AppConfig;
use patchloop_core::event::DomainEvent;
use patchloop_tools::process::ProcessManager;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::transcript;

/// A line of user input, classified.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Exit,
    Reset,
    SaveChat,
    Image,
    /// `automode` with an optional iteration cap
    Automode(Option<u32>),
    /// A command whose arguments did not parse
    Usage(&'static str),
    Message(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let lower = line.to_lowercase();
    match lower.as_str() {
        "" => Command::Empty,
        "exit" | "quit" => Command::Exit,
        "reset" => Command::Reset,
        "save chat" => Command::SaveChat,
        "image" => Command::Image,
        "automode" => Command::Automode(None),
        _ => match lower.strip_prefix("automode ") {
            Some(arg) => match arg.trim().parse::<u32>() {
                Ok(n) if n > 0 => Command::Automode(Some(n)),
                _ => Command::Usage("Usage: automode [iterations], iterations > 0"),
            },
            None => Command::Message(line.to_string()),
        },
    }
}

/// MIME type for the image formats the model accepts.
fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub async fn run(message: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PATCHLOOP_API_KEY=...");
        eprintln!("    GEMINI_API_KEY=...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let models = patchloop_providers::build_from_config(&config)?;
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let Runtime {
        mut orchestrator,
        processes,
        events,
    } = build_runtime(&config, models.main, models.editor, root.clone())?;
    spawn_event_printer(events.subscribe());

    if let Some(message) = message {
        let output = orchestrator.handle_user_message(&message, None).await;
        println!("{}", output.response);
        eprintln!("\n{}", orchestrator.session().tracker.report());
        processes.stop_all().await;
        return Ok(());
    }

    println!();
    println!("  Patchloop — Interactive Mode");
    println!("  ----------------------------");
    println!("  Project:   {}", root.display());
    println!("  Model:     {} (editor: {})", config.model, config.editor_model);
    println!();
    println!("  Commands:  exit | reset | save chat | image | automode [N]");
    println!("  Ctrl+C stops automode after the current step, or quits when idle.");
    println!();

    let interrupt = InterruptFlag::new();
    let automode_running = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(interrupt.clone(), automode_running.clone(), processes.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = read_line(&mut lines, "You > ").await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Exit => break,
            Command::Reset => {
                orchestrator.reset();
                println!("  Conversation, file context and token usage cleared.\n");
            }
            Command::SaveChat => {
                let name = transcript::file_name(chrono::Local::now());
                let markdown = transcript::render(orchestrator.session().conversation.current());
                match tokio::fs::write(&name, markdown).await {
                    Ok(()) => println!("  Chat saved to {name}\n"),
                    Err(e) => eprintln!("  [Error] Could not save chat: {e}\n"),
                }
            }
            Command::Image => {
                if let Some(image) = read_image(&mut lines).await? {
                    let Some(prompt) = read_line(&mut lines, "Prompt > ").await? else {
                        break;
                    };
                    let output = orchestrator.handle_user_message(&prompt, Some(image)).await;
                    print_turn(&orchestrator, &output);
                }
            }
            Command::Automode(iterations) => {
                let Some(goal) = read_line(&mut lines, "Goal > ").await? else {
                    break;
                };
                if goal.trim().is_empty() {
                    println!("  No goal given.\n");
                    continue;
                }
                let max = iterations.unwrap_or(config.agent.max_automode_iterations);
                run_automode(&mut orchestrator, goal.trim(), max, &interrupt, &automode_running)
                    .await;
            }
            Command::Usage(usage) => println!("  {usage}\n"),
            Command::Message(text) => {
                eprint!("  ...");
                let output = orchestrator.handle_user_message(&text, None).await;
                eprint!("\r     \r");
                print_turn(&orchestrator, &output);
            }
        }
    }

    let stopped = processes.stop_all().await;
    if stopped > 0 {
        println!("  Stopped {stopped} background process(es).");
    }
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn run_automode(
    orchestrator: &mut Orchestrator,
    goal: &str,
    max: u32,
    interrupt: &InterruptFlag,
    running: &AtomicBool,
) {
    println!("  Entering automode ({max} iterations max). Ctrl+C to stop.\n");
    running.store(true, Ordering::SeqCst);
    let report = orchestrator
        .run_automode(goal, max, interrupt, |iteration, output| {
            println!("  --- Automode iteration {iteration}/{max} ---");
            print_response(output);
        })
        .await;
    running.store(false, Ordering::SeqCst);

    let how = match report.outcome {
        AutomodeOutcome::Completed => "goal completed",
        AutomodeOutcome::MaxIterations => "iteration limit reached",
        AutomodeOutcome::Interrupted => "interrupted",
    };
    println!("  Exited automode after {} iteration(s): {how}.", report.iterations);
    println!("{}\n", orchestrator.session().tracker.report());
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> anyhow::Result<Option<String>> {
    print!("  {prompt}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn read_image(lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<ImageAttachment>> {
    let Some(raw) = read_line(lines, "Image path > ").await? else {
        return Ok(None);
    };
    // Paths dragged into a terminal often arrive quoted.
    let path = Path::new(raw.trim().trim_matches(|c| c == '"' || c == '\''));

    let Some(mime) = image_mime(path) else {
        println!("  Unsupported image type (use png, jpg, gif or webp).\n");
        return Ok(None);
    };
    match tokio::fs::read(path).await {
        Ok(data) => {
            debug!(path = %path.display(), bytes = data.len(), "Loaded image");
            Ok(Some(ImageAttachment {
                data,
                mime: mime.to_string(),
            }))
        }
        Err(e) => {
            println!("  Could not read {}: {e}\n", path.display());
            Ok(None)
        }
    }
}

fn print_turn(orchestrator: &Orchestrator, output: &TurnOutput) {
    print_response(output);
    println!("{}\n", orchestrator.session().tracker.report());
}

fn print_response(output: &TurnOutput) {
    println!();
    for line in output.response.lines() {
        println!("  Assistant > {line}");
    }
    println!();
}

/// Ctrl+C: stop automode at the next boundary, or quit when idle.
fn spawn_interrupt_handler(
    interrupt: InterruptFlag,
    automode_running: Arc<AtomicBool>,
    processes: Arc<ProcessManager>,
) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl+C");
                return;
            }
            if automode_running.load(Ordering::SeqCst) {
                interrupt.set();
                eprintln!("\n  Interrupt received; automode stops after the current step.");
            } else {
                let stopped = processes.stop_all().await;
                eprintln!("\n  Goodbye! ({stopped} background process(es) stopped)");
                std::process::exit(130);
            }
        }
    });
}

/// Print tool activity and applied edits as they happen.
fn spawn_event_printer(mut events: broadcast::Receiver<Arc<DomainEvent>>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match &*event {
                    DomainEvent::ToolExecuted {
                        tool_name,
                        is_error,
                        duration_ms,
                        ..
                    } => {
                        let status = if *is_error { "failed" } else { "ok" };
                        eprintln!("  [tool] {tool_name} {status} ({duration_ms} ms)");
                    }
                    DomainEvent::EditApplied {
                        path,
                        diff,
                        failed_edits,
                        ..
                    } => {
                        eprintln!("  [edit] {path}");
                        for line in diff.lines() {
                            eprintln!("    {line}");
                        }
                        if *failed_edits > 0 {
                            eprintln!("    ({failed_edits} edit(s) did not match)");
                        }
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(parse_command("EXIT"), Command::Exit);
        assert_eq!(parse_command("reset"), Command::Reset);
        assert_eq!(parse_command("Save Chat"), Command::SaveChat);
        assert_eq!(parse_command("image"), Command::Image);
        assert_eq!(parse_command("automode"), Command::Automode(None));
        assert_eq!(parse_command("automode 7"), Command::Automode(Some(7)));
        assert!(matches!(parse_command("automode zero"), Command::Usage(_)));
        assert!(matches!(parse_command("automode 0"), Command::Usage(_)));
        assert_eq!(
            parse_command("Fix the failing test"),
            Command::Message("Fix the failing test".into())
        );
    }

    #[test]
    fn image_mime_by_extension() {
        assert_eq!(image_mime(Path::new("shot.PNG")), Some("image/png"));
        assert_eq!(image_mime(Path::new("a/b.jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime(Path::new("notes.txt")), None);
        assert_eq!(image_mime(Path::new("noext")), None);
    }
}
