//! Environment-driven configuration for the catalog cache.
//!
//! Settings come from three layers: explicit overrides (used by tests and
//! embedders), process environment variables, and a `.env` file in the
//! working directory. Overrides win over the environment, and the
//! environment wins over the file.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DB_PATH: &str = "youtube.db";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Fully resolved settings needed to open a store and build a client.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub api_key: String,
    pub db_path: PathBuf,
    pub api_base: String,
}

/// Explicit value overrides applied on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_key: Option<String>,
    pub db_path: Option<PathBuf>,
    pub api_base: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn load_settings() -> Result<CatalogSettings> {
    resolve_settings(SettingsOverrides::default())
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<CatalogSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings_plain(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<CatalogSettings> {
    build_settings(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<CatalogSettings> {
    let api_key = overrides
        .api_key
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("YOUTUBE_API_KEY not set"))?;
    let db_path = overrides
        .db_path
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("YOUTUBE_DB_PATH", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let api_base = overrides
        .api_base
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup_value("YOUTUBE_API_BASE", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    Ok(CatalogSettings {
        api_key,
        db_path: PathBuf::from(db_path),
        api_base: api_base.trim_end_matches('/').to_string(),
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
