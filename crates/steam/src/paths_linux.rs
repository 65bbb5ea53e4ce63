use std::path::PathBuf;

use crate::controller::FLATPAK_APP_ID;

/// Roots probed, in order, when locating the active installation.
pub(crate) fn candidate_roots() -> Vec<PathBuf> {
    let Some(home) = home_dir() else {
        return Vec::new();
    };

    vec![
        // Primary location: ~/.steam/steam
        home.join(".steam").join("steam"),
        // Fallback: ~/.local/share/Steam
        home.join(".local").join("share").join("Steam"),
        // Flatpak location
        flatpak_home(&home).join(".local").join("share").join("Steam"),
    ]
}

/// Every root a Steam library (and therefore a compatdata tree) may live
/// under, before `libraryfolders.vdf` adds extra libraries.
pub(crate) fn library_candidates() -> Vec<PathBuf> {
    let Some(home) = home_dir() else {
        return Vec::new();
    };
    let flatpak = flatpak_home(&home);

    vec![
        home.join(".steam").join("steam"),
        home.join(".local").join("share").join("Steam"),
        home.join(".steam").join("root"),
        flatpak.join(".local").join("share").join("Steam"),
        flatpak.join("data").join("Steam"),
        flatpak.join(".steam").join("steam"),
    ]
}

fn flatpak_home(home: &std::path::Path) -> PathBuf {
    home.join(".var").join("app").join(FLATPAK_APP_ID)
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
