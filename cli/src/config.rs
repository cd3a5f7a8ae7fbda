//! Configuration (§6/§I ambient): merges CLI flags, `MEDIDUP_*` environment
//! variables, an optional TOML config file, and built-in defaults.
//!
//! Precedence, highest to lowest: explicit CLI flag, environment variable,
//! config file, built-in default. Config-file keys mirror the long flag
//! names (`prefer_remove`, `ignore`, `threads`, `extractor_path`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use medidup_core::{MedidupError, Result};

const DEFAULT_CONFIG_FILE: &str = ".medidup.toml";
const DEFAULT_EXTRACTOR_PATH: &str = "exiftool";

/// Raw shape of `.medidup.toml`; every field optional so a partial file is
/// valid.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    prefer_remove: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
    threads: Option<usize>,
    extractor_path: Option<String>,
}

/// Flags the CLI collects before merging; `Vec`s that are empty are treated
/// as "not given on the command line" for precedence purposes.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub prefer_remove: Vec<String>,
    pub ignore: Vec<String>,
    pub threads: Option<usize>,
    pub config_path: Option<PathBuf>,
    pub extractor_path: Option<String>,
}

/// The fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub prefer_remove: HashSet<String>,
    pub ignore: HashSet<String>,
    pub threads: Option<usize>,
    pub extractor_path: String,
}

impl ResolvedConfig {
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        let file = load_file_config(overrides.config_path.as_deref())?;

        let prefer_remove = merge_list(
            &overrides.prefer_remove,
            env_list("MEDIDUP_PREFER_REMOVE"),
            file.prefer_remove.clone(),
        );
        let ignore = merge_list(&overrides.ignore, env_list("MEDIDUP_IGNORE"), file.ignore.clone());

        let threads = overrides
            .threads
            .or_else(|| env_var("MEDIDUP_THREADS").and_then(|s| s.parse().ok()))
            .or(file.threads);

        let extractor_path = overrides
            .extractor_path
            .clone()
            .or_else(|| env_var("MEDIDUP_EXTRACTOR_PATH"))
            .or(file.extractor_path)
            .unwrap_or_else(|| DEFAULT_EXTRACTOR_PATH.to_string());

        Ok(ResolvedConfig {
            prefer_remove,
            ignore,
            threads,
            extractor_path,
        })
    }
}

/// Loads `.medidup.toml`, an explicit `--config` path, or neither. A missing
/// default-discovered file is not an error; a missing explicit `--config`
/// path is.
fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    match explicit {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| MedidupError::UserError {
                message: format!("failed to read config file {}: {e}", path.display()),
            })?;
            parse_toml(&text, path)
        }
        None => load_default_config_in(Path::new(".")),
    }
}

/// Looks for [`DEFAULT_CONFIG_FILE`] under `cwd` rather than unconditionally
/// reading the process's current directory, so tests can exercise the
/// "no default config file" path without mutating global process state
/// (`std::env::set_current_dir`) that would race with other tests running
/// in the same process.
fn load_default_config_in(cwd: &Path) -> Result<FileConfig> {
    let default_path = cwd.join(DEFAULT_CONFIG_FILE);
    if !default_path.exists() {
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(&default_path).map_err(|e| MedidupError::UserError {
        message: format!("failed to read {DEFAULT_CONFIG_FILE}: {e}"),
    })?;
    parse_toml(&text, &default_path)
}

fn parse_toml(text: &str, path: &Path) -> Result<FileConfig> {
    toml::from_str(text).map_err(|e| MedidupError::UserError {
        message: format!("failed to parse config file {}: {e}", path.display()),
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_var(name).map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
}

/// CLI flag wins outright when non-empty; otherwise env var; otherwise the
/// config file's list; otherwise empty.
fn merge_list(cli: &[String], env: Option<Vec<String>>, file: Option<Vec<String>>) -> HashSet<String> {
    if !cli.is_empty() {
        return cli.iter().cloned().collect();
    }
    if let Some(env) = env {
        return env.into_iter().collect();
    }
    file.unwrap_or_default().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_everything() {
        let result = merge_list(
            &["cli-value".to_string()],
            Some(vec!["env-value".to_string()]),
            Some(vec!["file-value".to_string()]),
        );
        assert_eq!(result, HashSet::from(["cli-value".to_string()]));
    }

    #[test]
    fn env_wins_over_file_when_cli_empty() {
        let result = merge_list(&[], Some(vec!["env-value".to_string()]), Some(vec!["file-value".to_string()]));
        assert_eq!(result, HashSet::from(["env-value".to_string()]));
    }

    #[test]
    fn falls_back_to_file_then_default() {
        let result = merge_list(&[], None, Some(vec!["file-value".to_string()]));
        assert_eq!(result, HashSet::from(["file-value".to_string()]));
        assert!(merge_list(&[], None, None).is_empty());
    }

    #[test]
    fn missing_default_config_file_is_not_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_default_config_in(dir.path()).is_ok());
    }

    #[test]
    fn present_default_config_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "threads = 4\n").unwrap();
        let config = load_default_config_in(dir.path()).unwrap();
        assert_eq!(config.threads, Some(4));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let err = load_file_config(Some(Path::new("/definitely/not/a/real/config.toml"))).unwrap_err();
        assert!(matches!(err, MedidupError::UserError { .. }));
    }
}
