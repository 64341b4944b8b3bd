//! External spell checker invocation.
//!
//! The checker is an opaque collaborator: it receives an input file and a
//! wordlist path and prints one misspelled token per line (empty output
//! means none found). The output is stored verbatim, never re-tokenized.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::SpellcheckConfig;

#[async_trait]
pub trait SpellChecker: Send + Sync {
    /// Returns the distinct misspelled tokens found in `text`, in checker
    /// output order.
    async fn check(&self, text: &str) -> Result<Vec<String>>;
}

/// Runs the configured checker binary as a subprocess, bounded by a timeout
/// so a wedged checker cannot outlive its request.
pub struct CommandSpellChecker {
    command: String,
    wordlist: PathBuf,
    timeout: Duration,
}

impl CommandSpellChecker {
    #[must_use]
    pub fn new(config: &SpellcheckConfig) -> Self {
        Self {
            command: config.command.clone(),
            wordlist: PathBuf::from(&config.wordlist_path),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

#[async_trait]
impl SpellChecker for CommandSpellChecker {
    async fn check(&self, text: &str) -> Result<Vec<String>> {
        let input_path =
            std::env::temp_dir().join(format!("spellcheckd-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&input_path, text)
            .await
            .context("Failed to write spell check input file")?;

        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.command)
                .arg(&input_path)
                .arg(&self.wordlist)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output(),
        )
        .await;

        tokio::fs::remove_file(&input_path).await.ok();

        let output = result
            .map_err(|_| {
                anyhow::anyhow!("Spell checker timed out after {}s", self.timeout.as_secs())
            })?
            .with_context(|| format!("Failed to run spell checker '{}'", self.command))?;

        if !output.status.success() {
            anyhow::bail!("Spell checker exited with status {}", output.status);
        }

        let words = parse_checker_output(&String::from_utf8_lossy(&output.stdout));
        debug!("Spell checker found {} misspelled tokens", words.len());

        Ok(words)
    }
}

fn parse_checker_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
