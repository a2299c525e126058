//! Command scripts: ordered command sequences with settle delays.
//!
//! Remote shells are stateful, so order is significant, and they offer no
//! reliable "ready" signal, so each step carries a settle delay the session
//! honors before moving on. Steps that carry credentials are marked hidden
//! and masked in logs.

use std::time::Duration;

/// Default settle delay after a command send.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

/// One command in a script.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    /// The command text (sent without the line terminator).
    pub command: String,

    /// Fixed wait after sending, in lieu of prompt detection.
    pub settle: Duration,

    /// Whether the command is masked in logs (passwords).
    pub hidden: bool,
}

impl ScriptStep {
    /// Create a step with the default settle delay.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            settle: DEFAULT_SETTLE,
            hidden: false,
        }
    }

    /// Override the settle delay.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Mask this step's command in logs.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// The command as it may appear in logs.
    pub fn display_command(&self) -> &str {
        if self.hidden { "********" } else { &self.command }
    }
}

/// An ordered sequence of script steps.
#[derive(Debug, Clone)]
pub struct CommandScript {
    steps: Vec<ScriptStep>,
    default_settle: Duration,
}

impl Default for CommandScript {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandScript {
    /// Create an empty script with the default settle delay.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            default_settle: DEFAULT_SETTLE,
        }
    }

    /// Change the settle delay applied to subsequent `step` calls.
    pub fn with_default_settle(mut self, settle: Duration) -> Self {
        self.default_settle = settle;
        self
    }

    /// Append a command with the script's default settle delay.
    pub fn step(mut self, command: impl Into<String>) -> Self {
        let settle = self.default_settle;
        self.steps.push(ScriptStep::new(command).with_settle(settle));
        self
    }

    /// Append a command with an explicit settle delay.
    pub fn step_with_settle(mut self, command: impl Into<String>, settle: Duration) -> Self {
        self.steps.push(ScriptStep::new(command).with_settle(settle));
        self
    }

    /// Append a hidden (masked in logs) command.
    pub fn hidden_step(mut self, command: impl Into<String>) -> Self {
        let settle = self.default_settle;
        self.steps
            .push(ScriptStep::new(command).with_settle(settle).hidden());
        self
    }

    /// Append an already-built step.
    pub fn push(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Iterate the steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &ScriptStep> {
        self.steps.iter()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the script has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_preserves_order() {
        let script = CommandScript::new()
            .step("mount /boot")
            .step("cd /boot")
            .step("ls");

        let commands: Vec<&str> = script.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, vec!["mount /boot", "cd /boot", "ls"]);
    }

    #[test]
    fn test_default_settle_applies_to_later_steps() {
        let script = CommandScript::new()
            .step("first")
            .with_default_settle(Duration::from_secs(2))
            .step("second");

        let settles: Vec<Duration> = script.iter().map(|s| s.settle).collect();
        assert_eq!(settles, vec![DEFAULT_SETTLE, Duration::from_secs(2)]);
    }

    #[test]
    fn test_explicit_settle() {
        let script =
            CommandScript::new().step_with_settle("md5sum test.bin", Duration::from_secs(10));
        assert_eq!(script.iter().next().unwrap().settle, Duration::from_secs(10));
    }

    #[test]
    fn test_hidden_step_masked() {
        let script = CommandScript::new().step("su").hidden_step("secret123");

        let steps: Vec<&ScriptStep> = script.iter().collect();
        assert_eq!(steps[0].display_command(), "su");
        assert_eq!(steps[1].display_command(), "********");
        assert_eq!(steps[1].command, "secret123");
    }
}
