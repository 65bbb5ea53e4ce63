use std::path::PathBuf;

use crate::SteamError;
use crate::paths::Paths;
use crate::vdf::VdfObject;
use crate::vdf_text;

/// Offset between a SteamID64 and the account ID used in `userdata/`.
pub const STEAMID64_BASE: u64 = 76_561_197_960_265_728;

/// The active local Steam profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamUser {
    pub steamid64: String,
    pub steamid3: u64,
    /// `userdata/<steamid3>/config`.
    pub config_dir: PathBuf,
}

impl SteamUser {
    /// Returns the user's `shortcuts.vdf` path.
    pub fn shortcuts_path(&self) -> PathBuf {
        self.config_dir.join("shortcuts.vdf")
    }
}

/// Resolves the active user of an auto-detected Steam installation.
pub fn resolve_active_user() -> Result<(Paths, SteamUser), SteamError> {
    let paths = Paths::new()?;
    let user = resolve_active_user_in(&paths)?;
    Ok((paths, user))
}

/// Resolves the active user under a known Steam root.
///
/// Nothing is cached; callers re-resolve per top-level operation so an
/// account switch between calls is picked up.
pub fn resolve_active_user_in(paths: &Paths) -> Result<SteamUser, SteamError> {
    let loginusers_path = paths.loginusers_path();
    if !loginusers_path.is_file() {
        return Err(SteamError::NotFound);
    }

    let loginusers = vdf_text::load_text(&loginusers_path)?;
    let steamid64 = most_recent_user(&loginusers)?;
    let steamid3 = to_steamid3(&steamid64)?;
    tracing::info!(%steamid64, steamid3, "resolved most recent Steam user");

    let config_dir = paths.config_dir(&steamid3.to_string());
    if !config_dir.is_dir() {
        tracing::error!(path = %config_dir.display(), "user config directory does not exist");
        return Err(SteamError::UserDataMissing(config_dir));
    }

    Ok(SteamUser {
        steamid64,
        steamid3,
        config_dir,
    })
}

/// Picks the SteamID64 of the most recent user from a parsed
/// `loginusers.vdf`.
///
/// The first entry flagged `MostRecent = "1"` wins; without a flag the
/// entry with the largest `Timestamp` is used.
pub fn most_recent_user(loginusers: &VdfObject) -> Result<String, SteamError> {
    let users = loginusers
        .get_object("users")
        .filter(|u| !u.is_empty())
        .ok_or(SteamError::NoActiveUser)?;

    let mut newest: Option<(u64, &str)> = None;
    for (steamid64, value) in users.iter() {
        let Some(user) = value.as_object() else {
            continue;
        };

        if user.get_str("MostRecent") == Some("1") {
            tracing::debug!(steamid64, "user flagged MostRecent");
            return Ok(steamid64.to_string());
        }

        let timestamp = user
            .get_str("Timestamp")
            .and_then(|t| t.trim().parse::<u64>().ok())
            .unwrap_or(0);
        if timestamp > 0 && newest.is_none_or(|(best, _)| timestamp > best) {
            newest = Some((timestamp, steamid64));
        }
    }

    newest
        .map(|(_, id)| id.to_string())
        .ok_or(SteamError::NoActiveUser)
}

/// Converts a SteamID64 to the account ID used for `userdata/` directories.
pub fn to_steamid3(steamid64: &str) -> Result<u64, SteamError> {
    let id: u64 = steamid64
        .trim()
        .parse()
        .map_err(|_| SteamError::InvalidSteamId(steamid64.to_string()))?;
    id.checked_sub(STEAMID64_BASE)
        .ok_or_else(|| SteamError::InvalidSteamId(steamid64.to_string()))
}
