//! Common test utilities for agentry CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Environment variables that would leak the developer's setup into a test
const SCRUBBED_ENV: &[&str] = &[
    "AGENTRY_MODEL",
    "OPENAI_API_KEY",
    "GROQ_API_KEY",
    "OPENROUTER_API_KEY",
    "OLLAMA_BASE_URL",
    "WEATHER_API_KEY",
    "GEO_API_KEY",
    "RUST_LOG",
];

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".agentry");
        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Command running the binary against this environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentry"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.current_dir(self.temp_dir.path());
        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Write a config file
    pub fn write_config(&self, config: &serde_json::Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), serde_json::to_string_pretty(config)?)?;
        Ok(())
    }
}
