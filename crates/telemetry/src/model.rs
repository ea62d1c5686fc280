//! Data model for per-role token accounting and usage reports.

use serde::{Deserialize, Serialize};

// ── Roles ─────────────────────────────────────────────────────────────────

/// The logical model role a call was made for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// The main conversation.
    Main,
    /// Follow-up calls that comment on tool results.
    ToolChecker,
    /// Search/replace edit generation.
    CodeEditor,
    /// Summaries of code execution results.
    CodeExecution,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Main,
        ModelRole::ToolChecker,
        ModelRole::CodeEditor,
        ModelRole::CodeExecution,
    ];

    /// Whether tokens for this role accumulate in a persistent context window.
    pub fn keeps_context(self) -> bool {
        matches!(self, Self::Main | Self::CodeEditor)
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "Main Model"),
            Self::ToolChecker => write!(f, "Tool Checker"),
            Self::CodeEditor => write!(f, "Code Editor"),
            Self::CodeExecution => write!(f, "Code Execution"),
        }
    }
}

// ── Counters ──────────────────────────────────────────────────────────────

/// Input/output token counts for one role.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenCounters {
    pub input: u64,
    pub output: u64,
}

impl TokenCounters {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }

    pub(crate) fn add(&mut self, input: u64, output: u64) {
        self.input = self.input.saturating_add(input);
        self.output = self.output.saturating_add(output);
    }
}

// ── Reports ───────────────────────────────────────────────────────────────

/// One row of a usage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUsage {
    pub role: ModelRole,
    pub counters: TokenCounters,
    /// Share of the context window used, for roles that keep context.
    pub context_percent: Option<f64>,
    pub cost_usd: f64,
}

/// A point-in-time usage report across all roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub rows: Vec<RoleUsage>,
    pub total: TokenCounters,
    pub total_cost_usd: f64,
    /// Combined share of the context window used by context-keeping roles.
    pub context_percent: f64,
}

impl std::fmt::Display for UsageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<16} {:>12} {:>12} {:>12} {:>10} {:>10}",
            "Model", "Input", "Output", "Total", "Context", "Cost ($)"
        )?;
        for row in &self.rows {
            let context = row
                .context_percent
                .map(|p| format!("{p:.2}%"))
                .unwrap_or_else(|| "-".into());
            writeln!(
                f,
                "{:<16} {:>12} {:>12} {:>12} {:>10} {:>10.3}",
                row.role.to_string(),
                row.counters.input,
                row.counters.output,
                row.counters.total(),
                context,
                row.cost_usd
            )?;
        }
        write!(
            f,
            "{:<16} {:>12} {:>12} {:>12} {:>9.2}% {:>10.3}",
            "Total",
            self.total.input,
            self.total.output,
            self.total.total(),
            self.context_percent,
            self.total_cost_usd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_total() {
        let mut c = TokenCounters::default();
        c.add(10, 5);
        c.add(1, 1);
        assert_eq!(c, TokenCounters { input: 11, output: 6 });
        assert_eq!(c.total(), 17);
    }

    #[test]
    fn context_roles() {
        assert!(ModelRole::Main.keeps_context());
        assert!(ModelRole::CodeEditor.keeps_context());
        assert!(!ModelRole::ToolChecker.keeps_context());
        assert!(!ModelRole::CodeExecution.keeps_context());
    }

    #[test]
    fn role_display() {
        assert_eq!(ModelRole::ToolChecker.to_string(), "Tool Checker");
    }
}
