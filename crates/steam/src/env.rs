//! Environment overrides for child processes.
//!
//! Overrides are attached to a single [`Command`]; the parent's own
//! environment is never modified.

use std::collections::{BTreeMap, BTreeSet};

use tokio::process::Command;

/// Display and session variables Steam's UI needs. Cleaning never
/// touches these.
pub const SESSION_VARS: &[&str] = &[
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "XDG_SESSION_TYPE",
    "DBUS_SESSION_BUS_ADDRESS",
    "XDG_RUNTIME_DIR",
    "XAUTHORITY",
    "XDG_CURRENT_DESKTOP",
    "XDG_SESSION_DESKTOP",
    "QT_QPA_PLATFORM",
    "GDK_BACKEND",
    "XDG_DATA_DIRS",
    "XDG_CONFIG_DIRS",
];

/// A set of variable assignments and removals for one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverride {
    set: BTreeMap<String, String>,
    unset: BTreeSet<String>,
}

impl EnvOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.unset.remove(&key);
        self.set.insert(key, value.into());
        self
    }

    pub fn unset(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.set.remove(&key);
        self.unset.insert(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Applies the override to `cmd`.
    pub fn apply_to(&self, cmd: &mut Command) {
        for key in &self.unset {
            cmd.env_remove(key);
        }
        for (key, value) in &self.set {
            cmd.env(key, value);
        }
    }

    /// Applies the override to an in-memory environment.
    pub fn apply_to_map(&self, env: &mut BTreeMap<String, String>) {
        for key in &self.unset {
            env.remove(key);
        }
        for (key, value) in &self.set {
            env.insert(key.clone(), value.clone());
        }
    }

    /// Override that undoes what an application bundle (AppImage or a
    /// frozen binary) injects into the loader environment.
    ///
    /// `LD_LIBRARY_PATH` is restored from `LD_LIBRARY_PATH_ORIG` when the
    /// bundler saved it, otherwise removed. `LD_PRELOAD` is removed and
    /// `PATH` loses entries under `$APPDIR`.
    pub fn clean_for_steam<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut cleaned = Self::new();

        cleaned = match vars.get("LD_LIBRARY_PATH_ORIG") {
            Some(orig) => cleaned.set("LD_LIBRARY_PATH", orig.as_str()),
            None if vars.contains_key("LD_LIBRARY_PATH") => cleaned.unset("LD_LIBRARY_PATH"),
            None => cleaned,
        };

        if vars.contains_key("LD_PRELOAD") {
            cleaned = cleaned.unset("LD_PRELOAD");
        }

        for bundle_var in ["_MEIPASS", "_MEIPASS2"] {
            if vars.contains_key(bundle_var) {
                cleaned = cleaned.unset(bundle_var);
            }
        }

        if let (Some(appdir), Some(path)) = (
            vars.get("APPDIR").filter(|d| !d.is_empty()),
            vars.get("PATH"),
        ) {
            let kept: Vec<&str> = path
                .split(':')
                .filter(|entry| !entry.starts_with(appdir.as_str()))
                .collect();
            let removed = path.split(':').count() - kept.len();
            if removed > 0 {
                tracing::debug!(removed, "stripped bundle entries from PATH");
                cleaned = cleaned.set("PATH", kept.join(":"));
            }
        }

        cleaned
    }

    /// [`EnvOverride::clean_for_steam`] over the current process
    /// environment. Variables that are not valid Unicode are ignored.
    pub fn clean_for_steam_from_current() -> Self {
        Self::clean_for_steam(std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        }))
    }

    /// Removals and assignments as `(key, Some(value))` / `(key, None)`.
    pub fn changes(&self) -> Vec<(String, Option<String>)> {
        self.unset
            .iter()
            .map(|k| (k.clone(), None))
            .chain(self.set.iter().map(|(k, v)| (k.clone(), Some(v.clone()))))
            .collect()
    }
}
