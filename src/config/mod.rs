#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::IssueTreeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub solve: SolveConfig,
    pub assistant: AssistantConfig,
    pub launcher: LauncherConfig,
    pub github: GithubConfig,
    pub watch: WatchConfig,
    pub status: StatusConfig,
    pub cleanup: CleanupConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolveConfig {
    /// Overrides default-branch detection when set.
    pub base_branch: Option<String>,
    pub copy_files: Vec<String>,
    pub link_dirs: Vec<String>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            base_branch: None,
            copy_files: vec![".env".to_owned(), ".env.local".to_owned()],
            link_dirs: vec!["node_modules".to_owned()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_owned(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    pub backend: LauncherBackend,
    pub zellij_command: String,
    pub zellij_session: String,
    /// Terminal emulator invocation; `sh -lc <command>` is appended.
    pub terminal_command: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            backend: LauncherBackend::Zellij,
            zellij_command: "zellij".to_owned(),
            zellij_session: "issuetree".to_owned(),
            terminal_command: default_terminal_command(),
        }
    }
}

/// Empty on macOS, where Terminal.app is driven through AppleScript.
fn default_terminal_command() -> Vec<String> {
    if cfg!(target_os = "macos") {
        Vec::new()
    } else {
        vec!["x-terminal-emulator".to_owned(), "-e".to_owned()]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LauncherBackend {
    Zellij,
    Terminal,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
    pub gh_command: String,
    pub issue_limit: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            gh_command: "gh".to_owned(),
            issue_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    pub concurrency: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanupConfig {
    pub settle_delay_ms: u64,
    pub close_windows: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            close_windows: true,
        }
    }
}

/// Token of a secondary account used for AI reviews of the user's own PRs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    if let Some(explicit) = std::env::var_os("ISSUETREE_CONFIG") {
        return Ok(ConfigPaths {
            config_file: PathBuf::from(explicit),
        });
    }

    let unix = home_config_path_unix();
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("com", "issuetree", "issuetree")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_config_path_unix() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("~"), PathBuf::from);
    home.join(".config").join("issuetree").join("config.toml")
}

pub fn load() -> anyhow::Result<(Config, ConfigPaths)> {
    let paths = default_paths()?;
    let (_doc, cfg) = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    log::debug!("loaded config from {}", paths.config_file.display());
    Ok((cfg, paths))
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    let (mut cfg, _paths) = load()?;
    if cfg.bot.token.is_some() {
        cfg.bot.token = Some("********".to_owned());
    }
    Ok(toml::to_string_pretty(&cfg)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

pub fn set_value_string(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = default_paths()?;
    set_value_string_at_path(&paths.config_file, key, value)
}

fn load_from_file(path: &Path) -> anyhow::Result<(toml_edit::DocumentMut, Config)> {
    if !path.exists() {
        return Ok((toml_edit::DocumentMut::new(), Config::default()));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let doc = raw
        .parse::<toml_edit::DocumentMut>()
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;

    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok((doc, cfg))
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let (_doc, cfg) = load_from_file(path)?;
    cfg.validate()?;
    Ok(lookup_value(&cfg, key).map(format_value_for_stdout))
}

pub fn set_value_string_at_path(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let (mut doc, cfg) = load_from_file(path)?;
    cfg.validate()?;

    let item = parse_value_for_key(key, value)?;
    apply_set(&mut doc, key, item)?;

    let new_raw = doc.to_string();
    let new_cfg: Config = toml::from_str(&new_raw)
        .with_context(|| format!("config update produced invalid TOML for {}", path.display()))?;
    new_cfg.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, new_raw.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<(), IssueTreeError> {
        if self.assistant.command.trim().is_empty() {
            return Err(IssueTreeError::Config(
                "assistant.command must not be empty".to_owned(),
            ));
        }
        if self.github.gh_command.trim().is_empty() {
            return Err(IssueTreeError::Config(
                "github.gh_command must not be empty".to_owned(),
            ));
        }
        if self.github.issue_limit == 0 {
            return Err(IssueTreeError::Config(
                "github.issue_limit must be >= 1".to_owned(),
            ));
        }
        if self.status.concurrency == 0 {
            return Err(IssueTreeError::Config(
                "status.concurrency must be >= 1".to_owned(),
            ));
        }
        if self.watch.poll_interval_ms < 100 {
            return Err(IssueTreeError::Config(
                "watch.poll_interval_ms must be >= 100".to_owned(),
            ));
        }
        if self.launcher.backend == LauncherBackend::Terminal
            && self.launcher.terminal_command.is_empty()
            && !cfg!(target_os = "macos")
        {
            return Err(IssueTreeError::Config(
                "launcher.terminal_command must not be empty with the terminal backend".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    Int,
    String,
    StringList,
    Enum(&'static [&'static str]),
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "solve.base_branch"
        | "assistant.command"
        | "launcher.zellij_command"
        | "launcher.zellij_session"
        | "github.gh_command"
        | "bot.token" => KeyType::String,

        "solve.copy_files" | "solve.link_dirs" | "assistant.args" | "launcher.terminal_command" => {
            KeyType::StringList
        }

        "watch.enabled" | "cleanup.close_windows" => KeyType::Bool,

        "github.issue_limit"
        | "watch.poll_interval_ms"
        | "status.concurrency"
        | "cleanup.settle_delay_ms" => KeyType::Int,

        "launcher.backend" => KeyType::Enum(&["zellij", "terminal", "none"]),

        _ => return None,
    })
}

fn parse_value_for_key(key: &str, value: &str) -> anyhow::Result<toml_edit::Item> {
    let key_type = key_type(key).ok_or_else(|| IssueTreeError::InvalidConfigKey(key.to_owned()))?;
    let invalid = |msg: String| IssueTreeError::InvalidConfigValue {
        key: key.to_owned(),
        msg,
    };
    let item = match key_type {
        KeyType::Bool => toml_edit::value(parse_bool(value).map_err(invalid)?),
        KeyType::Int => toml_edit::value(parse_int(value).map_err(invalid)?),
        KeyType::String => toml_edit::value(value),
        KeyType::StringList => {
            let mut arr = toml_edit::Array::new();
            for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                arr.push(part);
            }
            toml_edit::value(arr)
        }
        KeyType::Enum(allowed) => {
            let v = value.trim();
            if !allowed.contains(&v) {
                return Err(invalid(format!("must be one of: {}", allowed.join(", "))).into());
            }
            toml_edit::value(v)
        }
    };
    Ok(item)
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.trim()
        .parse::<i64>()
        .map_err(|e| format!("expected integer, got '{s}': {e}"))
}

fn apply_set(
    doc: &mut toml_edit::DocumentMut,
    key: &str,
    value: toml_edit::Item,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(IssueTreeError::InvalidConfigKey(key.to_owned()).into());
    };

    let mut cur = doc.as_table_mut();
    for seg in tables {
        if !cur.contains_key(seg) {
            let mut t = toml_edit::Table::new();
            t.set_implicit(true);
            cur.insert(seg, toml_edit::Item::Table(t));
        }
        cur = cur[seg].as_table_mut().ok_or_else(|| {
            IssueTreeError::Config(format!("cannot set {key}: '{seg}' is not a table"))
        })?;
    }

    cur.insert(leaf, value);
    Ok(())
}

fn lookup_value(cfg: &Config, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(format_value_for_stdout)
            .collect::<Vec<_>>()
            .join(","),
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn config_validation_catches_invalid_values() {
        let mut cfg = Config::default();
        cfg.status.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.watch.poll_interval_ms = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[watch]\npoll_interval_ms = 5000\n").unwrap();
        assert_eq!(cfg.watch.poll_interval_ms, 5000);
        assert!(cfg.watch.enabled);
        assert_eq!(cfg.assistant.command, "claude");
        assert_eq!(cfg.solve.copy_files, vec![".env", ".env.local"]);
    }

    #[test]
    fn config_set_and_get_dot_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        set_value_string_at_path(&path, "bot.token", "ghp_example").unwrap();
        assert_eq!(
            get_value_string_at_path(&path, "bot.token")
                .unwrap()
                .as_deref(),
            Some("ghp_example")
        );

        set_value_string_at_path(&path, "launcher.backend", "terminal").unwrap();
        set_value_string_at_path(&path, "solve.link_dirs", "node_modules, .venv").unwrap();
        set_value_string_at_path(&path, "cleanup.settle_delay_ms", "250").unwrap();
        assert_eq!(
            get_value_string_at_path(&path, "solve.link_dirs")
                .unwrap()
                .as_deref(),
            Some("node_modules,.venv")
        );

        assert!(set_value_string_at_path(&path, "launcher.backend", "tmux").is_err());
        assert!(set_value_string_at_path(&path, "no.such_key", "1").is_err());
        assert!(set_value_string_at_path(&path, "watch.enabled", "yes").is_err());

        let (_doc, cfg) = load_from_file(&path).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.bot.token.as_deref(), Some("ghp_example"));
        assert_eq!(cfg.launcher.backend, LauncherBackend::Terminal);
        assert_eq!(cfg.cleanup.settle_delay_ms, 250);
        assert_eq!(cfg.solve.link_dirs, vec!["node_modules", ".venv"]);
    }
}
