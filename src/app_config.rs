//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bookshelf_core::checkpoint::JobKind;
use bookshelf_core::db::{DEFAULT_BUSY_TIMEOUT_MS, DatabaseOptions};
use bookshelf_core::enrich::{
    DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT_SECS, FetchConfig,
};

/// Database file used when neither the CLI nor the config file names one.
pub const DEFAULT_DATABASE_PATH: &str = "data.db";

const MAX_BATCH_SIZE: u64 = 100_000;

/// Key/value file configuration for bookshelf defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// SQLite database file.
    pub database_path: Option<PathBuf>,
    /// Directory holding the per-job checkpoint files.
    pub checkpoint_dir: Option<PathBuf>,
    pub author_batch_size: Option<usize>,
    /// Batch size for the books and thumbhash jobs.
    pub book_batch_size: Option<usize>,
    /// Concurrent image fetches (1..=100).
    pub enrich_concurrency: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// Database pool max connections (1..=20).
    pub db_max_connections: Option<u32>,
    pub db_busy_timeout_ms: Option<u32>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_batch_size("author_batch_size", self.author_batch_size)?;
        validate_batch_size("book_batch_size", self.book_batch_size)?;

        if let Some(concurrency) = self.enrich_concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `enrich_concurrency`: {concurrency}. Expected range: 1..=100"
            );
        }

        validate_timeout_secs("fetch_timeout_secs", self.fetch_timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;

        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!(
                "Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000"
            );
        }

        Ok(())
    }
}

fn validate_batch_size(field: &str, value: Option<usize>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value == 0 || value as u64 > MAX_BATCH_SIZE {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={MAX_BATCH_SIZE}");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Effective settings after layering the config file over built-in defaults.
/// Per-command CLI flags are applied on top by the commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub author_batch_size: usize,
    pub book_batch_size: usize,
    pub enrich_concurrency: usize,
    pub fetch: FetchConfig,
    pub database: DatabaseOptions,
}

impl Settings {
    /// Resolves settings with priority CLI > config file > defaults.
    #[must_use]
    pub fn resolve(
        cli_db: Option<&Path>,
        cli_checkpoint_dir: Option<&Path>,
        file: Option<&FileConfig>,
    ) -> Self {
        let file = file.cloned().unwrap_or_default();
        let defaults = DatabaseOptions::default();

        Self {
            database_path: cli_db
                .map(Path::to_path_buf)
                .or(file.database_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            checkpoint_dir: cli_checkpoint_dir
                .map(Path::to_path_buf)
                .or(file.checkpoint_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            author_batch_size: file
                .author_batch_size
                .unwrap_or_else(|| JobKind::Authors.default_batch_size()),
            book_batch_size: file
                .book_batch_size
                .unwrap_or_else(|| JobKind::Books.default_batch_size()),
            enrich_concurrency: file.enrich_concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            fetch: FetchConfig {
                timeout: Duration::from_secs(
                    file.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
                connect_timeout: Duration::from_secs(
                    file.connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                ..FetchConfig::default()
            },
            database: DatabaseOptions {
                max_connections: file.db_max_connections.unwrap_or(defaults.max_connections),
                busy_timeout_ms: file.db_busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            },
        }
    }

    /// Batch size for `job` before any `--batch-size` override.
    #[must_use]
    pub fn batch_size(&self, job: JobKind) -> usize {
        match job {
            JobKind::Authors => self.author_batch_size,
            JobKind::Books | JobKind::Thumbhash => self.book_batch_size,
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookshelf/config.toml`
/// 2. `$HOME/.config/bookshelf/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bookshelf")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bookshelf")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "database_path" => {
                cfg.database_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "checkpoint_dir" => {
                cfg.checkpoint_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "author_batch_size" => {
                cfg.author_batch_size = Some(parse_integer_usize(value).with_context(context)?);
            }
            "book_batch_size" => {
                cfg.book_batch_size = Some(parse_integer_usize(value).with_context(context)?);
            }
            "enrich_concurrency" => {
                cfg.enrich_concurrency = Some(parse_integer_usize(value).with_context(context)?);
            }
            "fetch_timeout_secs" => {
                cfg.fetch_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "db_max_connections" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_max_connections out of range for u32"))?;
                cfg.db_max_connections = Some(n);
            }
            "db_busy_timeout_ms" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_busy_timeout_ms out of range for u32"))?;
                cfg.db_busy_timeout_ms = Some(n);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_integer_usize(raw_value: &str) -> Result<usize> {
    let value = parse_integer_u64(raw_value)?;
    usize::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
database_path = "/var/lib/bookshelf/data.db"
enrich_concurrency = 8
"#,
        )
        .expect("partial config should parse");
        assert_eq!(
            cfg.database_path,
            Some(PathBuf::from("/var/lib/bookshelf/data.db"))
        );
        assert_eq!(cfg.enrich_concurrency, Some(8));
        assert!(cfg.checkpoint_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_keys() {
        let cfg = parse_config_str(
            r#"
database_path = "books.db"
checkpoint_dir = "state"
author_batch_size = 500
book_batch_size = 250
enrich_concurrency = 4
fetch_timeout_secs = 15
connect_timeout_secs = 5
db_max_connections = 3
db_busy_timeout_ms = 1000
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.author_batch_size, Some(500));
        assert_eq!(cfg.book_batch_size, Some(250));
        assert_eq!(cfg.fetch_timeout_secs, Some(15));
        assert_eq!(cfg.connect_timeout_secs, Some(5));
        assert_eq!(cfg.db_max_connections, Some(3));
        assert_eq!(cfg.db_busy_timeout_ms, Some(1000));
    }

    #[test]
    fn test_parse_config_rejects_invalid_concurrency() {
        let err =
            parse_config_str("enrich_concurrency = 0").expect_err("invalid concurrency expected");
        assert!(err.to_string().contains("enrich_concurrency"));
    }

    #[test]
    fn test_parse_config_rejects_zero_batch_size() {
        let err = parse_config_str("book_batch_size = 0").expect_err("invalid batch size expected");
        assert!(err.to_string().contains("book_batch_size"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("concurrency = 4").expect_err("unknown key expected");
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("author_batch_size = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("author_batch_size"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_path() {
        let err = parse_config_str("database_path = data.db").expect_err("expected string error");
        assert!(err.to_string().contains("database_path"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
enrich_concurrency = 4 # workers
checkpoint_dir = "state#1" # hash inside quotes is kept
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.enrich_concurrency, Some(4));
        assert_eq!(cfg.checkpoint_dir, Some(PathBuf::from("state#1")));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::resolve(None, None, None);
        assert_eq!(settings.database_path, PathBuf::from("data.db"));
        assert_eq!(settings.checkpoint_dir, PathBuf::from("."));
        assert_eq!(settings.batch_size(JobKind::Authors), 2000);
        assert_eq!(settings.batch_size(JobKind::Books), 900);
        assert_eq!(settings.batch_size(JobKind::Thumbhash), 900);
        assert_eq!(settings.enrich_concurrency, 10);
        assert_eq!(settings.fetch.timeout, Duration::from_secs(30));
        assert_eq!(settings.fetch.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_settings_cli_overrides_file() {
        let file = FileConfig {
            database_path: Some(PathBuf::from("file.db")),
            checkpoint_dir: Some(PathBuf::from("file-state")),
            book_batch_size: Some(50),
            ..FileConfig::default()
        };

        let settings = Settings::resolve(Some(Path::new("cli.db")), None, Some(&file));

        assert_eq!(settings.database_path, PathBuf::from("cli.db"));
        assert_eq!(settings.checkpoint_dir, PathBuf::from("file-state"));
        assert_eq!(settings.batch_size(JobKind::Books), 50);
    }
}
