//! Native Steam integration: binary/text VDF codecs, the per-user shortcut
//! store, `config.vdf` compat tool mapping, Steam restart control and
//! Proton prefix discovery.

pub mod backup;
pub mod compat_tool;
pub mod config;
pub mod controller;
#[cfg(target_os = "linux")]
mod controller_linux;
pub mod env;
pub mod paths;
#[cfg(target_os = "linux")]
mod paths_linux;
pub mod prefix;
pub mod setup;
pub mod shortcuts;
pub mod users;
pub mod vdf;
pub mod vdf_text;

use std::path::PathBuf;

// Re-export primary types.
pub use compat_tool::{CompatToolMapper, DuplicatePolicy, TextSpliceMapper};
pub use config::{RestartStrategy, Settings};
pub use controller::{
    Controller, RestartFailure, RestartResult, RestartState, SteamPlatform, SteamProcesses,
};
#[cfg(target_os = "linux")]
pub use controller_linux::LinuxProcesses;
pub use env::EnvOverride;
pub use paths::Paths;
pub use prefix::{find_compatdata, find_wine_prefix, library_roots};
pub use setup::{SetupOutcome, ShortcutRequest, SteamSetup};
pub use shortcuts::{
    AppIdAllocator, CreatedShortcut, ExeNameAppIds, IndexAppIds, NewShortcut, RandomAppIds,
    Shortcut, ShortcutStore, signed_to_unsigned, unsigned_to_signed,
};
pub use users::{SteamUser, most_recent_user, resolve_active_user, to_steamid3};
pub use vdf::{VdfObject, VdfValue, decode_binary, encode_binary};
pub use vdf_text::{decode_text, encode_text};

/// Errors for Steam operations.
#[derive(Debug, thiserror::Error)]
pub enum SteamError {
    #[error("steam installation not found")]
    NotFound,

    #[error("no active steam user in loginusers.vdf")]
    NoActiveUser,

    #[error("userdata directory missing: {}", .0.display())]
    UserDataMissing(PathBuf),

    #[error("invalid SteamID64: {0}")]
    InvalidSteamId(String),

    #[error("config.vdf not found at {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("section \"{0}\" not found")]
    SectionNotFound(String),

    #[error("section \"{0}\" has unbalanced braces")]
    MalformedSection(String),

    #[error("VDF parse error: {0}")]
    Vdf(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("app id allocation failed: {0}")]
    AppIdCollision(String),

    #[error("controller error: {0}")]
    Controller(String),

    #[error("timeout: {0}")]
    Timeout(String),
}
