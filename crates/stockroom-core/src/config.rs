use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STOCKROOM_DIR: &str = ".stockroom";

/// Default history page size, matching the asset detail view.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Relative paths resolve against `.stockroom/`.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Fields the change detector skips.
    #[serde(default)]
    pub ignored_fields: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            ignored_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// `<root>/.stockroom`.
#[must_use]
pub fn stockroom_dir(project_root: &Path) -> PathBuf {
    project_root.join(STOCKROOM_DIR)
}

/// Walk up from `start` to the first directory containing `.stockroom/`.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| stockroom_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

/// Absolute database path for a project.
#[must_use]
pub fn database_path(project_root: &Path, config: &ProjectConfig) -> PathBuf {
    if config.database.path.is_absolute() {
        config.database.path.clone()
    } else {
        stockroom_dir(project_root).join(&config.database.path)
    }
}

/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = stockroom_dir(project_root).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("stockroom/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Default `config.toml` written by `sr init`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_default_config() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).context("serialize default config")
}

/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path, cli_format: Option<&str>) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let configured = project.output.format.clone().or_else(|| user.output.clone());
    let resolved_output = resolve_output(cli_format, configured, env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn normalize_output_mode(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "human" => Some("pretty"),
        "text" | "table" => Some("text"),
        "json" => Some("json"),
        _ => None,
    }
}

/// Output mode by precedence: flag, `FORMAT` env, config, then TTY detection.
#[must_use]
pub fn resolve_output(
    cli_format: Option<&str>,
    configured: Option<String>,
    env_format: Option<String>,
) -> String {
    [
        cli_format.and_then(normalize_output_mode),
        env_format.as_deref().and_then(normalize_output_mode),
        configured.as_deref().and_then(normalize_output_mode),
    ]
    .into_iter()
    .flatten()
    .next()
    .map_or_else(
        || {
            if std::io::stdout().is_terminal() {
                "pretty".to_string()
            } else {
                "text".to_string()
            }
        },
        ToString::to_string,
    )
}

fn default_database_path() -> PathBuf {
    PathBuf::from("stockroom.sqlite3")
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
