use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

/// Settings read from `MOMO_*` environment variables (and `.env`, if present)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Extra classification rules (JSON)
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("momo.db")
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    pub fn new() -> Result<Self, anyhow::Error> {
        // A missing .env file is fine, the environment may already be set
        dotenv::dotenv().ok();

        Self::from_env(std::env::vars())
    }

    pub fn from_env<I>(vars: I) -> Result<Self, anyhow::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("MOMO_")
            .from_iter(vars)
            .context("invalid MOMO_* environment variables")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            rules_path: None,
        }
    }
}
