//! A [`CommandRunner`] that never spawns anything.
//!
//! Every command is recorded. Commands whose command line starts with a
//! configured prefix can fail, return canned stdout, trigger a side effect
//! or take a while to finish.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{DeployError, Result};
use crate::process::{CommandRunner, CommandSpec};

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    prepended: Mutex<Vec<PathBuf>>,
    failures: Vec<(String, String)>,
    responses: Vec<(String, String)>,
    effects: Vec<(String, Effect)>,
    delays: Vec<(String, Duration)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose command line starts with `prefix`.
    pub fn fail_on(self, prefix: impl Into<String>) -> Self {
        self.fail_with(prefix, "scripted failure")
    }

    /// Like [`fail_on`](Self::fail_on), with the stderr the command reports.
    pub fn fail_with(mut self, prefix: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.failures.push((prefix.into(), stderr.into()));
        self
    }

    /// Sleep for `delay` before commands starting with `prefix` succeed or fail.
    pub fn delay_on(mut self, prefix: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((prefix.into(), delay));
        self
    }

    /// Return `stdout` for commands whose command line starts with `prefix`.
    pub fn respond_to(mut self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.responses.push((prefix.into(), stdout.into()));
        self
    }

    /// Run `effect` on commands starting with `prefix`, before any delay or
    /// scripted failure.
    pub fn on_run<F>(mut self, prefix: impl Into<String>, effect: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.effects.push((prefix.into(), Box::new(effect)));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Number of recorded commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    pub fn prepended_paths(&self) -> Vec<PathBuf> {
        self.prepended
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(spec.clone());

        let line = spec.command_line();
        for (prefix, effect) in &self.effects {
            if line.starts_with(prefix) {
                effect(spec);
            }
        }
        for (prefix, delay) in &self.delays {
            if line.starts_with(prefix) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some((_, stderr)) = self.failures.iter().find(|(p, _)| line.starts_with(p)) {
            return Err(DeployError::CommandFailed {
                command: line,
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }

        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default())
    }

    fn prepend_path(&self, dir: &Path) {
        self.prepended
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(dir.to_path_buf());
    }
}
