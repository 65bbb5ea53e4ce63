use std::path::{Path, PathBuf};

use crate::SteamError;

/// Provides access to the file layout under one Steam root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Locates the Steam installation, trying the configured `steam_path`
    /// override before the standard candidate roots.
    pub fn new() -> Result<Self, SteamError> {
        let settings = crate::config::Settings::load();
        let mut candidates = Vec::new();
        if let Some(path) = settings.steam_path {
            candidates.push(path);
        }
        candidates.extend(candidate_roots());
        find_installation_in(&candidates).ok_or(SteamError::NotFound)
    }

    /// Creates a new `Paths` instance with a custom base directory.
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the Steam base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the userdata directory.
    pub fn user_data_dir(&self) -> PathBuf {
        self.base_dir.join("userdata")
    }

    /// Returns the directory for a specific user (SteamID3).
    pub fn user_dir(&self, steamid3: &str) -> PathBuf {
        self.user_data_dir().join(steamid3)
    }

    /// Returns the config directory for a user.
    pub fn config_dir(&self, steamid3: &str) -> PathBuf {
        self.user_dir(steamid3).join("config")
    }

    /// Returns the path to shortcuts.vdf for a user.
    pub fn shortcuts_path(&self, steamid3: &str) -> PathBuf {
        self.config_dir(steamid3).join("shortcuts.vdf")
    }

    pub fn loginusers_path(&self) -> PathBuf {
        self.base_dir.join("config").join("loginusers.vdf")
    }

    /// Returns the shared `config/config.vdf` holding `CompatToolMapping`.
    pub fn config_vdf_path(&self) -> PathBuf {
        self.base_dir.join("config").join("config.vdf")
    }

    /// Both places Steam has kept `libraryfolders.vdf` over the years.
    pub fn library_folders_paths(&self) -> [PathBuf; 2] {
        [
            self.base_dir.join("config").join("libraryfolders.vdf"),
            self.base_dir.join("steamapps").join("libraryfolders.vdf"),
        ]
    }

    /// Returns `steamapps/compatdata/<app_id>` under this root.
    pub fn compatdata_dir(&self, app_id: u32) -> PathBuf {
        self.base_dir
            .join("steamapps")
            .join("compatdata")
            .join(app_id.to_string())
    }

    /// A usable installation has both `config/loginusers.vdf` and `userdata/`.
    pub fn is_installation(&self) -> bool {
        self.loginusers_path().is_file() && self.user_data_dir().is_dir()
    }
}

/// Returns the first candidate root that is a usable installation.
pub fn find_installation_in(candidates: &[PathBuf]) -> Option<Paths> {
    candidates.iter().find_map(|root| {
        let paths = Paths::with_base(root);
        if paths.is_installation() {
            tracing::info!(root = %root.display(), "found Steam installation");
            Some(paths)
        } else {
            None
        }
    })
}

// Platform-specific candidate roots.
#[cfg(target_os = "linux")]
fn candidate_roots() -> Vec<PathBuf> {
    crate::paths_linux::candidate_roots()
}

#[cfg(not(target_os = "linux"))]
fn candidate_roots() -> Vec<PathBuf> {
    Vec::new()
}
