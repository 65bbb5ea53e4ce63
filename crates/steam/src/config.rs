//! Settings read from `~/.config/jackify/config.json`.
//!
//! The file is owned by the application layer; this crate only reads the
//! keys it needs and ignores the rest.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Proton build used when neither the caller nor the settings name one.
pub const DEFAULT_PROTON: &str = "proton_experimental";

/// How Steam is brought back up after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartStrategy {
    /// Cleaned environment, `-foreground`, and a direct/setsid/nohup
    /// fallback chain on native installs.
    #[default]
    Hardened,
    /// One plain launch with the inherited environment.
    Simple,
}

impl RestartStrategy {
    /// Parses the settings value; unknown values fall back to `Hardened`.
    pub fn from_setting(value: &str) -> Self {
        match value {
            "nak_simple" => RestartStrategy::Simple,
            "jackify" => RestartStrategy::Hardened,
            other => {
                tracing::debug!(value = other, "unknown restart strategy, using hardened");
                RestartStrategy::Hardened
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RestartStrategy::Hardened => "Jackify hardened restart",
            RestartStrategy::Simple => "NaK simple restart",
        }
    }
}

/// On-disk format. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    steam_restart_strategy: Option<String>,
    #[serde(default)]
    steam_path: Option<PathBuf>,
    #[serde(default)]
    game_proton_path: Option<String>,
    #[serde(default)]
    proton_version: Option<String>,
}

/// Settings consumed by the Steam integration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub restart_strategy: RestartStrategy,
    pub steam_path: Option<PathBuf>,
    pub proton_version: Option<String>,
}

impl Settings {
    /// Loads settings from the default location, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load() -> Self {
        match settings_file_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Loads settings from a specific file.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "failed to read settings: {e}");
                }
                return Self::default();
            }
        };

        match serde_json::from_str::<SettingsFile>(&content) {
            Ok(file) => Self::from_file(file),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "failed to parse settings, using defaults: {e}"
                );
                Self::default()
            }
        }
    }

    fn from_file(file: SettingsFile) -> Self {
        let restart_strategy = file
            .steam_restart_strategy
            .as_deref()
            .map(RestartStrategy::from_setting)
            .unwrap_or_default();

        // `game_proton_path` is either a bare build name or a path whose
        // last component names the build.
        let proton_version = file
            .game_proton_path
            .as_deref()
            .and_then(proton_name_from_setting)
            .or(file.proton_version.filter(|v| !v.is_empty() && !is_auto(v)));

        Self {
            restart_strategy,
            steam_path: file.steam_path.filter(|p| !p.as_os_str().is_empty()),
            proton_version,
        }
    }

    /// Returns the configured Proton build or [`DEFAULT_PROTON`].
    pub fn proton_or_default(&self) -> &str {
        self.proton_version.as_deref().unwrap_or(DEFAULT_PROTON)
    }
}

/// Placeholders that mean "no explicit build".
fn is_auto(value: &str) -> bool {
    value.eq_ignore_ascii_case("auto") || value.eq_ignore_ascii_case("same_as_install")
}

fn proton_name_from_setting(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() || is_auto(trimmed) {
        return None;
    }
    let name = Path::new(trimmed).file_name()?.to_string_lossy();
    Some(steam_tool_name(&name))
}

/// Name `CompatToolMapping` expects for a Proton install directory.
///
/// GE-Proton directories are used verbatim. Valve builds are lowercased
/// with separators folded to `_` and a `proton_` prefix, so
/// `Proton - Experimental` becomes `proton_experimental`.
pub fn steam_tool_name(dir_name: &str) -> String {
    if dir_name.starts_with("GE-Proton") {
        return dir_name.to_string();
    }
    let name = dir_name
        .to_lowercase()
        .replace(" - ", "_")
        .replace([' ', '-'], "_");
    if name.starts_with("proton") {
        name
    } else {
        format!("proton_{name}")
    }
}

/// Returns `$XDG_CONFIG_HOME/jackify/config.json`, or the `~/.config`
/// equivalent.
pub fn settings_file_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("jackify").join("config.json"))
}
