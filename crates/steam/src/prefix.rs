//! Proton prefix discovery across every known Steam library.
//!
//! Read-only: nothing here creates or modifies directories. A missing
//! prefix is a normal outcome (the shortcut has not been launched yet).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Paths;
use crate::vdf::VdfObject;
use crate::vdf_text;

/// Every Steam library root on this machine: the standard install
/// locations plus extra libraries listed in `libraryfolders.vdf`.
pub fn library_roots() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = crate::config::Settings::load().steam_path {
        candidates.push(path);
    }
    candidates.extend(library_candidates());
    library_roots_from(&candidates)
}

/// Expands existing `candidates` with the libraries they register,
/// deduplicated (through symlinks) in discovery order.
pub fn library_roots_from(candidates: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |path: PathBuf, roots: &mut Vec<PathBuf>| {
        if !path.is_dir() {
            return;
        }
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            roots.push(path);
        }
    };

    for candidate in candidates {
        if !candidate.is_dir() {
            continue;
        }
        add(candidate.clone(), &mut roots);

        for vdf in Paths::with_base(candidate).library_folders_paths() {
            if vdf.is_file() {
                for library in library_folder_paths(&vdf) {
                    add(library, &mut roots);
                }
            }
        }
    }

    tracing::debug!(count = roots.len(), "discovered Steam libraries");
    roots
}

/// Library paths listed in one `libraryfolders.vdf`. An unreadable file
/// contributes nothing.
pub fn library_folder_paths(vdf_path: &Path) -> Vec<PathBuf> {
    match vdf_text::load_text(vdf_path) {
        Ok(root) => parse_library_folders(&root),
        Err(e) => {
            tracing::warn!(path = %vdf_path.display(), "failed to parse libraryfolders.vdf: {e}");
            Vec::new()
        }
    }
}

/// Handles both layouts: current (`"0" { "path" "..." }`) and legacy
/// (`"1" "/path"`).
pub fn parse_library_folders(root: &VdfObject) -> Vec<PathBuf> {
    let Some((_, folders)) = root.iter().find_map(|(k, v)| v.as_object().map(|o| (k, o))) else {
        return Vec::new();
    };

    folders
        .iter()
        .filter(|(key, _)| key.parse::<u32>().is_ok())
        .filter_map(|(_, value)| match value.as_object() {
            Some(folder) => folder.get_str("path").map(PathBuf::from),
            None => value.as_str().map(PathBuf::from),
        })
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// `steamapps/compatdata/<app_id>` in the first library that has it.
pub fn find_compatdata(app_id: u32) -> Option<PathBuf> {
    find_compatdata_in(&library_roots(), app_id)
}

pub fn find_compatdata_in(roots: &[PathBuf], app_id: u32) -> Option<PathBuf> {
    let found = roots
        .iter()
        .map(|root| Paths::with_base(root).compatdata_dir(app_id))
        .find(|dir| dir.is_dir());
    match &found {
        Some(dir) => tracing::info!(path = %dir.display(), "found compatdata"),
        None => tracing::debug!(app_id, "no compatdata yet"),
    }
    found
}

/// The Wine prefix (`compatdata/<app_id>/pfx`) for `app_id`, if it exists.
pub fn find_wine_prefix(app_id: u32) -> Option<PathBuf> {
    find_wine_prefix_in(&library_roots(), app_id)
}

pub fn find_wine_prefix_in(roots: &[PathBuf], app_id: u32) -> Option<PathBuf> {
    roots
        .iter()
        .map(|root| Paths::with_base(root).compatdata_dir(app_id).join("pfx"))
        .find(|pfx| pfx.is_dir())
}

#[cfg(target_os = "linux")]
fn library_candidates() -> Vec<PathBuf> {
    crate::paths_linux::library_candidates()
}

#[cfg(not(target_os = "linux"))]
fn library_candidates() -> Vec<PathBuf> {
    Vec::new()
}
