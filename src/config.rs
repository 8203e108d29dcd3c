//! Command-line and environment configuration.
//!
//! Precedence: command-line flag, then environment variable, then built-in default.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::llm::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::logging::LogMode;
use crate::prompt::DEFAULT_TEMPERATURE;
use crate::storage::validate_db_extension;

pub const DB_PATH_ENV: &str = "ARCHIVE_DB_PATH";
pub const MODEL_ENV: &str = "ARCHIVE_MODEL";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "API_KEY";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "living-archive", version, about = "Converse with the swarm and grow The Living Archive")]
pub struct Args {
    /// SQLite database file (must end in .db)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Keep graph and conversation in memory only
    #[arg(long, conflicts_with = "db_path")]
    pub ephemeral: bool,

    /// Gemini model name
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Base URL of the Generative Language API
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base_url: String,

    /// Timeout for one streamed reply, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Append logs to this file
    #[arg(short, long)]
    pub log: Option<String>,

    /// Also log to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageTarget {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageTarget,
    pub model: String,
    pub temperature: f32,
    pub api_base_url: String,
    pub timeout_seconds: u64,
    /// Never sourced from flags, only from the environment
    pub api_key: Option<String>,
    pub log_file: Option<String>,
    pub log_mode: LogMode,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Resolve `args` against an environment lookup.
    pub fn resolve<E>(args: Args, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        if !(0.0..=2.0).contains(&args.temperature) {
            bail!("Temperature must be between 0.0 and 2.0 (got {})", args.temperature);
        }

        let storage = if args.ephemeral {
            StorageTarget::Memory
        } else {
            let path = args
                .db_path
                .or_else(|| env(DB_PATH_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
                .unwrap_or_else(default_db_path);
            StorageTarget::Sqlite(validate_db_path(&path)?)
        };

        let model = args
            .model
            .or_else(|| env(MODEL_ENV))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_key = env(API_KEY_ENV)
            .or_else(|| env(FALLBACK_API_KEY_ENV))
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            storage,
            model,
            temperature: args.temperature,
            api_base_url: args.api_base_url,
            timeout_seconds: args.timeout,
            api_key,
            log_file: args.log,
            log_mode: if args.verbose { LogMode::Verbose } else { LogMode::Interactive },
        })
    }
}

pub fn default_db_path() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("living-archive");
    path.push("archive.db");
    path
}

/// Validate database path to prevent path traversal attacks
pub fn validate_db_path(path: &Path) -> Result<PathBuf> {
    // Check file extension FIRST (before any filesystem operations)
    validate_db_extension(path)?;

    // Canonicalize path to resolve .. and symlinks
    let canonical = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) => {
            // If file doesn't exist yet, canonicalize parent and append filename
            let filename = path.file_name().context("Invalid path: no filename")?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            parent.canonicalize()?.join(filename)
        }
    };

    if !canonical.is_absolute() {
        bail!("Database path must be absolute");
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("living-archive").chain(argv.iter().copied())).unwrap()
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_flag_overrides_env_db_path() {
        let dir = TempDir::new().unwrap();
        let flag = dir.path().join("flag.db");
        let from_env = dir.path().join("env.db");

        let config = Config::resolve(
            parse(&["--db-path", flag.to_str().unwrap()]),
            env_from(&[(DB_PATH_ENV, from_env.to_str().unwrap())]),
        )
        .unwrap();

        let StorageTarget::Sqlite(path) = config.storage else {
            panic!("expected sqlite storage");
        };
        assert_eq!(path.file_name().unwrap(), "flag.db");
    }

    #[test]
    fn test_env_db_path_and_api_key_fallback() {
        let dir = TempDir::new().unwrap();
        let from_env = dir.path().join("sub").join("env.db");

        let config = Config::resolve(
            parse(&[]),
            env_from(&[(DB_PATH_ENV, from_env.to_str().unwrap()), (FALLBACK_API_KEY_ENV, "secret")]),
        )
        .unwrap();

        assert!(matches!(config.storage, StorageTarget::Sqlite(ref p) if p.ends_with("sub/env.db")));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.log_mode, LogMode::Interactive);
    }

    #[test]
    fn test_ephemeral_uses_memory() {
        let config = Config::resolve(parse(&["--ephemeral", "-v"]), env_from(&[])).unwrap();
        assert_eq!(config.storage, StorageTarget::Memory);
        assert_eq!(config.log_mode, LogMode::Verbose);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        let result = Config::resolve(parse(&["--ephemeral", "--temperature", "3.5"]), env_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_db_path_extension() {
        assert!(validate_db_path(Path::new("/tmp/archive.txt")).is_err());
        assert!(validate_db_path(Path::new("/tmp/archive")).is_err());
    }
}
