//! Per-user `shortcuts.vdf` store.
//!
//! The file is always rewritten whole: read, mutate the tree, encode, then
//! replace through [`crate::backup`].

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::SteamError;
use crate::backup;
use crate::users::SteamUser;
use crate::vdf::{self, VdfObject, VdfValue};

/// Tag applied to shortcuts when the caller gives none.
pub const DEFAULT_TAG: &str = "Jackify";

/// Launch options that let Proton wrap the executable.
pub const DEFAULT_LAUNCH_OPTIONS: &str = "%command%";

/// Inclusive range of AppIDs handed out by [`RandomAppIds`].
pub const RANDOM_APP_ID_MIN: i32 = -999_999_999;
pub const RANDOM_APP_ID_MAX: i32 = -100_000_000;

const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Chooses the AppID of a new shortcut.
///
/// The store rejects a value already present in the file and asks again,
/// so deterministic strategies fail fast on a genuine clash.
pub trait AppIdAllocator {
    fn allocate(&mut self, index: u32, exe: &str, name: &str) -> i32;
}

/// Random negative AppIDs in `[RANDOM_APP_ID_MIN, RANDOM_APP_ID_MAX]`.
///
/// Keeps new shortcuts away from IDs Steam may still hold in its internal
/// cache, at the cost of re-discovering the ID after a restart.
#[derive(Debug)]
pub struct RandomAppIds {
    rng: StdRng,
}

impl RandomAppIds {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence, for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomAppIds {
    fn default() -> Self {
        Self::new()
    }
}

impl AppIdAllocator for RandomAppIds {
    fn allocate(&mut self, _index: u32, _exe: &str, _name: &str) -> i32 {
        self.rng.gen_range(RANDOM_APP_ID_MIN..=RANDOM_APP_ID_MAX)
    }
}

/// `0x80000000 + index`, wrapped into the signed range.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexAppIds;

impl AppIdAllocator for IndexAppIds {
    fn allocate(&mut self, index: u32, _exe: &str, _name: &str) -> i32 {
        unsigned_to_signed(0x8000_0000u32.wrapping_add(index))
    }
}

/// The ID Steam's own client derives from the quoted exe and the name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExeNameAppIds;

impl AppIdAllocator for ExeNameAppIds {
    fn allocate(&mut self, _index: u32, exe: &str, name: &str) -> i32 {
        unsigned_to_signed(generate_app_id(exe, name))
    }
}

/// Generates a Steam shortcut app ID from executable path and name.
///
/// Matches Steam's algorithm: `CRC32(exe + name) | 0x80000000 | 0x02000000`.
pub fn generate_app_id(exe: &str, name: &str) -> u32 {
    let key = format!("{exe}{name}");
    let mut hasher = Hasher::new();
    hasher.update(key.as_bytes());
    let crc = hasher.finalize();
    (crc | 0x80000000) | 0x02000000
}

/// Signed `shortcuts.vdf` form to the unsigned form used in `config.vdf`
/// and `compatdata/`.
pub fn signed_to_unsigned(app_id: i32) -> u32 {
    app_id as u32
}

pub fn unsigned_to_signed(app_id: u32) -> i32 {
    app_id as i32
}

/// A shortcut entry as read back from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub index: String,
    pub app_id: i32,
    pub app_name: String,
    /// Quoted, as stored.
    pub exe: String,
    pub start_dir: String,
    pub icon: String,
    pub launch_options: String,
    pub is_hidden: bool,
    pub is_installed: bool,
    pub tags: Vec<String>,
}

impl Shortcut {
    fn from_vdf(index: &str, entry: &VdfObject) -> Self {
        let text = |key: &str| {
            entry
                .get_ignore_case(key)
                .and_then(VdfValue::to_string_lossy)
                .map(|s| s.into_owned())
                .unwrap_or_default()
        };
        let flag = |key: &str| {
            entry
                .get_ignore_case(key)
                .and_then(VdfValue::as_i32)
                .is_some_and(|v| v != 0)
        };

        Self {
            index: index.to_string(),
            app_id: entry
                .get_ignore_case("appid")
                .and_then(VdfValue::as_i32)
                .unwrap_or_default(),
            app_name: text("AppName"),
            exe: text("Exe"),
            start_dir: text("StartDir"),
            icon: text("icon"),
            launch_options: text("LaunchOptions"),
            is_hidden: flag("IsHidden"),
            is_installed: flag("IsInstalled"),
            tags: entry
                .get_object("tags")
                .map(|t| t.iter().filter_map(|(_, v)| v.as_str()).map(String::from).collect())
                .unwrap_or_default(),
        }
    }

    pub fn unsigned_app_id(&self) -> u32 {
        signed_to_unsigned(self.app_id)
    }

    /// The executable path without surrounding quotes.
    pub fn exe_path(&self) -> &str {
        unquote(&self.exe)
    }
}

/// Request to add a shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShortcut {
    pub name: String,
    pub exe: PathBuf,
    /// Defaults to the executable's directory.
    pub start_dir: Option<PathBuf>,
    pub launch_options: String,
    pub tags: Vec<String>,
}

impl NewShortcut {
    pub fn new(name: impl Into<String>, exe: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            exe: exe.into(),
            start_dir: None,
            launch_options: DEFAULT_LAUNCH_OPTIONS.to_string(),
            tags: vec![DEFAULT_TAG.to_string()],
        }
    }

    pub fn with_start_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.start_dir = Some(dir.into());
        self
    }

    pub fn with_launch_options(mut self, options: impl Into<String>) -> Self {
        self.launch_options = options.into();
        self
    }

    /// An empty list is written as the single tag [`DEFAULT_TAG`].
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Where a new shortcut landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedShortcut {
    pub index: u32,
    pub app_id: i32,
}

impl CreatedShortcut {
    pub fn unsigned_app_id(&self) -> u32 {
        signed_to_unsigned(self.app_id)
    }
}

/// Reads and rewrites one user's `shortcuts.vdf`.
pub struct ShortcutStore {
    path: PathBuf,
    allocator: Box<dyn AppIdAllocator + Send>,
}

impl std::fmt::Debug for ShortcutStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortcutStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ShortcutStore {
    /// Store backed by `path`, allocating random AppIDs.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            allocator: Box::new(RandomAppIds::new()),
        }
    }

    pub fn for_user(user: &SteamUser) -> Self {
        Self::new(user.shortcuts_path())
    }

    /// Replaces the AppID strategy.
    pub fn with_allocator(mut self, allocator: impl AppIdAllocator + Send + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decodes the file. A missing or zero-byte file is an empty root.
    pub fn read(&self) -> Result<VdfObject, SteamError> {
        match fs::read(&self.path) {
            Ok(data) => vdf::decode_binary(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VdfObject::new()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to read shortcuts: {e}");
                Err(SteamError::Io(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        }
    }

    /// Every shortcut, in file order.
    pub fn shortcuts(&self) -> Result<Vec<Shortcut>, SteamError> {
        let root = self.read()?;
        Ok(entries(&root)
            .map(|(index, entry)| Shortcut::from_vdf(index, entry))
            .collect())
    }

    /// `AppName` to the absolute value of its AppID, as a decimal string.
    pub fn list_shortcuts(&self) -> Result<BTreeMap<String, String>, SteamError> {
        Ok(self
            .shortcuts()?
            .into_iter()
            .map(|s| (s.app_name, s.app_id.unsigned_abs().to_string()))
            .collect())
    }

    /// Appends a shortcut at the next dense index and writes the file.
    pub fn create_shortcut(&mut self, request: &NewShortcut) -> Result<CreatedShortcut, SteamError> {
        tracing::info!(
            name = %request.name,
            exe = %request.exe.display(),
            "creating shortcut"
        );

        let mut root = self.read()?;
        let created = self.append_entry(&mut root, request)?;
        self.write(&root)?;

        tracing::info!(index = created.index, app_id = created.app_id, "shortcut created");
        Ok(created)
    }

    /// Drops every shortcut whose name matches `request.name` (trimmed,
    /// case-insensitive), renumbers the rest and appends the new entry.
    /// Nothing is written unless the new entry could be built, so a
    /// failure leaves the old shortcuts in place.
    pub fn replace_shortcut(&mut self, request: &NewShortcut) -> Result<CreatedShortcut, SteamError> {
        let mut root = self.read()?;
        let before = entries(&root).count();
        let kept: VdfObject = entries(&root)
            .filter(|(index, entry)| {
                !matches_shortcut(&Shortcut::from_vdf(index, entry), &request.name, None)
            })
            .enumerate()
            .map(|(new_index, (_, entry))| {
                (new_index.to_string(), VdfValue::Object(entry.clone()))
            })
            .collect();
        let removed = before - kept.len();
        root.insert("shortcuts", kept);

        let created = self.append_entry(&mut root, request)?;
        self.write(&root)?;

        tracing::info!(
            name = %request.name,
            removed,
            index = created.index,
            app_id = created.app_id,
            "shortcut replaced"
        );
        Ok(created)
    }

    fn append_entry(
        &mut self,
        root: &mut VdfObject,
        request: &NewShortcut,
    ) -> Result<CreatedShortcut, SteamError> {
        let existing: HashSet<i32> = entries(root)
            .filter_map(|(_, e)| e.get_ignore_case("appid").and_then(VdfValue::as_i32))
            .collect();
        let index = next_index(root)?;

        let exe = quote(&request.exe.to_string_lossy());
        let app_id = self.allocate_unique(index, &exe, &request.name, &existing)?;

        let start_dir = match &request.start_dir {
            Some(dir) => dir.clone(),
            None => request
                .exe
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let icon = find_icon(&request.exe);
        if !icon.is_empty() {
            tracing::info!(icon = %icon, "using shortcut icon");
        }

        let mut tags = VdfObject::new();
        if request.tags.is_empty() {
            tags.push("0", DEFAULT_TAG);
        }
        for (i, tag) in request.tags.iter().enumerate() {
            tags.push(i.to_string(), tag.as_str());
        }

        let mut entry = VdfObject::new();
        entry.push("appid", app_id);
        entry.push("AppName", request.name.as_str());
        entry.push("Exe", exe);
        entry.push("StartDir", quote(&start_dir.to_string_lossy()));
        entry.push("icon", icon);
        entry.push("ShortcutPath", "");
        entry.push("LaunchOptions", request.launch_options.as_str());
        entry.push("IsHidden", 0);
        entry.push("AllowDesktopConfig", 1);
        entry.push("AllowOverlay", 1);
        entry.push("OpenVR", 0);
        entry.push("Devkit", 0);
        entry.push("DevkitGameID", "");
        entry.push("DevkitOverrideAppID", 0);
        entry.push("LastPlayTime", 0);
        entry.push("IsInstalled", 1);
        entry.push("FlatpakAppID", "");
        entry.push("tags", tags);

        shortcuts_mut(root)?.push(index.to_string(), entry);
        Ok(CreatedShortcut { index, app_id })
    }

    /// Removes the first shortcut named `name` and renumbers the rest.
    /// Returns `false` if no shortcut has that name.
    pub fn remove_shortcut(&self, name: &str) -> Result<bool, SteamError> {
        let mut root = self.read()?;
        let Some(shortcuts) = root.get_object("shortcuts") else {
            return Ok(false);
        };

        let Some(target) = shortcuts
            .iter()
            .position(|(_, v)| v.as_object().and_then(|e| e.get_str("AppName")) == Some(name))
        else {
            tracing::debug!(name, "no shortcut to remove");
            return Ok(false);
        };

        let renumbered: VdfObject = shortcuts
            .clone()
            .into_entries()
            .into_iter()
            .enumerate()
            .filter(|(pos, _)| *pos != target)
            .enumerate()
            .map(|(new_index, (_, (_, value)))| (new_index.to_string(), value))
            .collect();
        root.insert("shortcuts", renumbered);

        self.write(&root)?;
        tracing::info!(name, "removed shortcut");
        Ok(true)
    }

    /// Rewrites `LaunchOptions` of the shortcut matching `name` (and `exe`,
    /// when given). Returns `false` if nothing matched.
    pub fn update_launch_options(
        &self,
        name: &str,
        exe: Option<&str>,
        options: &str,
    ) -> Result<bool, SteamError> {
        let mut root = self.read()?;
        let Some(shortcuts) = root.get_object_mut("shortcuts") else {
            return Ok(false);
        };

        let Some(index) = shortcuts
            .iter()
            .find(|(index, v)| {
                v.as_object()
                    .is_some_and(|e| matches_shortcut(&Shortcut::from_vdf(index, e), name, exe))
            })
            .map(|(index, _)| index.to_string())
        else {
            return Ok(false);
        };

        if let Some(entry) = shortcuts.get_object_mut(&index) {
            entry.insert("LaunchOptions", options);
        }
        self.write(&root)?;
        tracing::info!(name, options, "updated launch options");
        Ok(true)
    }

    /// Finds the AppID of a shortcut by name and, optionally, executable.
    ///
    /// Names compare trimmed and case-insensitively; executables compare
    /// unquoted and case-insensitively.
    pub fn find_app_id(&self, name: &str, exe: Option<&str>) -> Result<Option<i32>, SteamError> {
        Ok(self
            .shortcuts()?
            .into_iter()
            .find(|s| matches_shortcut(s, name, exe))
            .map(|s| s.app_id))
    }

    /// Every shortcut whose executable's file name is `file_name`.
    pub fn find_by_executable(&self, file_name: &str) -> Result<Vec<Shortcut>, SteamError> {
        Ok(self
            .shortcuts()?
            .into_iter()
            .filter(|s| {
                Path::new(s.exe_path())
                    .file_name()
                    .is_some_and(|n| n.eq_ignore_ascii_case(file_name))
            })
            .collect())
    }

    /// Raw bytes of the current file, or `None` if it does not exist.
    pub fn snapshot(&self) -> Result<Option<Vec<u8>>, SteamError> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SteamError::Io(format!(
                "failed to snapshot {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Puts `snapshot` back if the file is now missing, empty or
    /// undecodable. Returns whether a restore happened.
    pub fn restore_if_damaged(&self, snapshot: &[u8]) -> Result<bool, SteamError> {
        if snapshot.is_empty() {
            return Ok(false);
        }

        let damaged = match fs::read(&self.path) {
            Ok(data) => data.is_empty() || vdf::decode_binary(&data).is_err(),
            Err(_) => true,
        };
        if !damaged {
            return Ok(false);
        }

        tracing::warn!(path = %self.path.display(), "shortcuts file damaged, restoring snapshot");
        backup::backup_then_replace(&self.path, snapshot)?;
        Ok(true)
    }

    fn allocate_unique(
        &mut self,
        index: u32,
        exe: &str,
        name: &str,
        existing: &HashSet<i32>,
    ) -> Result<i32, SteamError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = self.allocator.allocate(index, exe, name);
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::warn!(candidate, attempt, "AppID already in use, retrying");
        }
        Err(SteamError::AppIdCollision(format!(
            "no free AppID for '{name}' after {MAX_ALLOCATION_ATTEMPTS} attempts"
        )))
    }

    fn write(&self, root: &VdfObject) -> Result<(), SteamError> {
        let data = vdf::encode_binary(root);
        backup::backup_then_replace(&self.path, &data)?;
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "wrote shortcuts");
        Ok(())
    }
}

fn entries(root: &VdfObject) -> impl Iterator<Item = (&str, &VdfObject)> {
    root.get_object("shortcuts")
        .into_iter()
        .flat_map(|s| s.iter())
        .filter_map(|(k, v)| v.as_object().map(|e| (k, e)))
}

fn shortcuts_mut(root: &mut VdfObject) -> Result<&mut VdfObject, SteamError> {
    root.ensure_object("shortcuts")
        .ok_or_else(|| SteamError::Vdf("\"shortcuts\" is not an object".into()))
}

/// Max numeric key + 1, or 0.
fn next_index(root: &VdfObject) -> Result<u32, SteamError> {
    let max = root
        .get_object("shortcuts")
        .into_iter()
        .flat_map(|s| s.keys())
        .filter_map(|k| k.parse::<u32>().ok())
        .max();
    match max {
        None => Ok(0),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| SteamError::Vdf(format!("shortcut index {max} leaves no room for another"))),
    }
}

fn matches_shortcut(shortcut: &Shortcut, name: &str, exe: Option<&str>) -> bool {
    if !shortcut
        .app_name
        .trim()
        .eq_ignore_ascii_case(name.trim())
    {
        return false;
    }
    match exe {
        Some(exe) => normalize_exe(shortcut.exe_path()) == normalize_exe(exe),
        None => true,
    }
}

fn normalize_exe(exe: &str) -> String {
    unquote(exe).trim_end_matches('/').to_lowercase()
}

fn quote(s: &str) -> String {
    format!("\"{s}\"")
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"').trim()
}

/// Icon for a shortcut: `SteamIcons/grid-tall.png` beside the executable,
/// else the first PNG in that directory, else empty.
pub fn find_icon(exe: &Path) -> String {
    let Some(icons_dir) = exe.parent().map(|p| p.join("SteamIcons")) else {
        return String::new();
    };

    let preferred = icons_dir.join("grid-tall.png");
    if preferred.is_file() {
        return preferred.to_string_lossy().into_owned();
    }

    let Ok(dir) = fs::read_dir(&icons_dir) else {
        return String::new();
    };
    let mut pngs: Vec<PathBuf> = dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    pngs.sort();
    pngs.first()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<i32>);

    impl AppIdAllocator for Scripted {
        fn allocate(&mut self, _index: u32, _exe: &str, _name: &str) -> i32 {
            self.0.pop_front().unwrap_or(-1)
        }
    }

    fn store_in(dir: &Path) -> ShortcutStore {
        ShortcutStore::new(dir.join("shortcuts.vdf")).with_allocator(RandomAppIds::seeded(7))
    }

    #[test]
    fn generate_app_id_deterministic() {
        let id1 = generate_app_id("/usr/bin/game", "My Game");
        let id2 = generate_app_id("/usr/bin/game", "My Game");
        assert_eq!(id1, id2);
    }

    #[test]
    fn generate_app_id_high_bits_set() {
        let id = generate_app_id("/bin/test", "Test");
        assert_ne!(id & 0x80000000, 0);
        assert_ne!(id & 0x02000000, 0);
    }

    #[test]
    fn index_allocator_wraps_into_signed_range() {
        let mut ids = IndexAppIds;
        assert_eq!(ids.allocate(0, "", ""), i32::MIN);
        assert_eq!(signed_to_unsigned(ids.allocate(5, "", "")), 0x8000_0005);
    }

    #[test]
    fn sign_conversion() {
        assert_eq!(signed_to_unsigned(-1), u32::MAX);
        assert_eq!(unsigned_to_signed(3_000_000_000), -1_294_967_296);
        assert_eq!(unsigned_to_signed(signed_to_unsigned(-123_456_789)), -123_456_789);
    }

    #[test]
    fn zero_byte_file_then_create() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shortcuts.vdf");
        fs::write(&path, b"").unwrap();

        let mut store = ShortcutStore::new(&path);
        let request = NewShortcut::new("MyModlist", "/games/MM/ModOrganizer.exe")
            .with_launch_options("%command%");
        let created = store.create_shortcut(&request).unwrap();

        assert!((RANDOM_APP_ID_MIN..=RANDOM_APP_ID_MAX).contains(&created.app_id));
        assert_eq!(created.index, 0);

        let root = vdf::load_binary(&path).unwrap();
        let shortcuts = root.get_object("shortcuts").unwrap();
        assert_eq!(shortcuts.len(), 1);
        let entry = shortcuts.get_object("0").unwrap();
        assert_eq!(entry.get_str("AppName"), Some("MyModlist"));
        assert_eq!(entry.get_str("Exe"), Some("\"/games/MM/ModOrganizer.exe\""));
        assert_eq!(entry.get_str("StartDir"), Some("\"/games/MM\""));
        assert_eq!(entry.get_str("LaunchOptions"), Some("%command%"));
        assert_eq!(entry.get("appid").and_then(VdfValue::as_i32), Some(created.app_id));
        assert_eq!(
            entry.get_object("tags").and_then(|t| t.get_str("0")),
            Some(DEFAULT_TAG)
        );
    }

    #[test]
    fn new_entry_carries_every_steam_field_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store
            .create_shortcut(&NewShortcut::new("Game", "/g/game.exe"))
            .unwrap();

        let root = store.read().unwrap();
        let entry = root
            .get_object("shortcuts")
            .and_then(|s| s.get_object("0"))
            .unwrap();
        assert_eq!(
            entry.keys().collect::<Vec<_>>(),
            vec![
                "appid",
                "AppName",
                "Exe",
                "StartDir",
                "icon",
                "ShortcutPath",
                "LaunchOptions",
                "IsHidden",
                "AllowDesktopConfig",
                "AllowOverlay",
                "OpenVR",
                "Devkit",
                "DevkitGameID",
                "DevkitOverrideAppID",
                "LastPlayTime",
                "IsInstalled",
                "FlatpakAppID",
                "tags",
            ]
        );
        assert_eq!(entry.get("IsInstalled").and_then(VdfValue::as_i32), Some(1));
        assert_eq!(entry.get("IsHidden").and_then(VdfValue::as_i32), Some(0));
    }

    #[test]
    fn sequential_creates_get_distinct_indices_and_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());

        let mut ids = HashSet::new();
        for i in 0..10u32 {
            let created = store
                .create_shortcut(&NewShortcut::new(format!("Game {i}"), format!("/g/{i}/game.exe")))
                .unwrap();
            assert_eq!(created.index, i);
            assert!(ids.insert(created.app_id));
        }

        let listed = store.list_shortcuts().unwrap();
        assert_eq!(listed.len(), 10);
        let indices: Vec<_> = store.shortcuts().unwrap().into_iter().map(|s| s.index).collect();
        assert_eq!(indices, (0..10).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn collision_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shortcuts.vdf");

        let mut store =
            ShortcutStore::new(&path).with_allocator(Scripted(VecDeque::from([-200_000_000, -200_000_000, -300_000_000])));
        let first = store.create_shortcut(&NewShortcut::new("A", "/a/a.exe")).unwrap();
        let second = store.create_shortcut(&NewShortcut::new("B", "/b/b.exe")).unwrap();

        assert_eq!(first.app_id, -200_000_000);
        assert_eq!(second.app_id, -300_000_000);
    }

    #[test]
    fn exhausted_retries_are_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shortcuts.vdf");

        let mut store = ShortcutStore::new(&path).with_allocator(ExeNameAppIds);
        store.create_shortcut(&NewShortcut::new("Same", "/x/same.exe")).unwrap();
        let before = fs::read(&path).unwrap();

        let err = store
            .create_shortcut(&NewShortcut::new("Same", "/x/same.exe"))
            .unwrap_err();
        assert!(matches!(err, SteamError::AppIdCollision(_)));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn list_uses_absolute_app_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store =
            store_in(tmp.path()).with_allocator(Scripted(VecDeque::from([-123_456_789])));
        store.create_shortcut(&NewShortcut::new("Neg", "/n/n.exe")).unwrap();

        let listed = store.list_shortcuts().unwrap();
        assert_eq!(listed.get("Neg").map(String::as_str), Some("123456789"));
    }

    #[test]
    fn missing_file_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        assert!(store.list_shortcuts().unwrap().is_empty());
        assert!(!store.remove_shortcut("anything").unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        fs::write(store.path(), [0x00, b's', b'h']).unwrap();
        assert!(matches!(store.shortcuts(), Err(SteamError::Vdf(_))));
    }

    #[test]
    fn remove_renumbers_remaining_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        for name in ["A", "B", "C"] {
            store
                .create_shortcut(&NewShortcut::new(name, format!("/g/{name}.exe")))
                .unwrap();
        }

        assert!(store.remove_shortcut("B").unwrap());
        assert!(!store.remove_shortcut("B").unwrap());

        let remaining = store.shortcuts().unwrap();
        let summary: Vec<_> = remaining
            .iter()
            .map(|s| (s.index.as_str(), s.app_name.as_str()))
            .collect();
        assert_eq!(summary, vec![("0", "A"), ("1", "C")]);

        let next = store.create_shortcut(&NewShortcut::new("D", "/g/D.exe")).unwrap();
        assert_eq!(next.index, 2);
    }

    #[test]
    fn find_app_id_matches_name_and_exe() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        let created = store
            .create_shortcut(&NewShortcut::new("Skyrim Modlist", "/games/sky/ModOrganizer.exe"))
            .unwrap();
        store
            .create_shortcut(&NewShortcut::new("Skyrim Modlist", "/games/other/ModOrganizer.exe"))
            .unwrap();

        assert_eq!(
            store
                .find_app_id("  skyrim modlist ", Some("/Games/Sky/ModOrganizer.exe"))
                .unwrap(),
            Some(created.app_id)
        );
        assert_eq!(
            store.find_app_id("Skyrim Modlist", None).unwrap(),
            Some(created.app_id)
        );
        assert_eq!(store.find_app_id("Fallout", None).unwrap(), None);
    }

    #[test]
    fn find_by_executable_matches_basename() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store
            .create_shortcut(&NewShortcut::new("One", "/a/ModOrganizer.exe"))
            .unwrap();
        store.create_shortcut(&NewShortcut::new("Two", "/b/game.exe")).unwrap();
        store
            .create_shortcut(&NewShortcut::new("Three", "/c/modorganizer.exe"))
            .unwrap();

        let found: Vec<_> = store
            .find_by_executable("ModOrganizer.exe")
            .unwrap()
            .into_iter()
            .map(|s| s.app_name)
            .collect();
        assert_eq!(found, vec!["One", "Three"]);
    }

    #[test]
    fn update_launch_options_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.create_shortcut(&NewShortcut::new("A", "/a/a.exe")).unwrap();
        store.create_shortcut(&NewShortcut::new("B", "/b/b.exe")).unwrap();

        assert!(store
            .update_launch_options("B", Some("\"/b/b.exe\""), "STEAM_COMPAT_MOUNTS=/mnt %command%")
            .unwrap());
        assert!(!store.update_launch_options("Z", None, "%command%").unwrap());

        let shortcuts = store.shortcuts().unwrap();
        assert_eq!(shortcuts[0].launch_options, "%command%");
        assert_eq!(shortcuts[1].launch_options, "STEAM_COMPAT_MOUNTS=/mnt %command%");
    }

    #[test]
    fn restore_if_damaged_only_when_needed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.create_shortcut(&NewShortcut::new("A", "/a/a.exe")).unwrap();
        let snapshot = store.snapshot().unwrap().unwrap();

        assert!(!store.restore_if_damaged(&snapshot).unwrap());

        fs::write(store.path(), b"").unwrap();
        assert!(store.restore_if_damaged(&snapshot).unwrap());
        assert_eq!(fs::read(store.path()).unwrap(), snapshot);

        fs::remove_file(store.path()).unwrap();
        assert!(store.restore_if_damaged(&snapshot).unwrap());
        assert_eq!(store.shortcuts().unwrap()[0].app_name, "A");
    }

    #[test]
    fn every_write_leaves_a_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.create_shortcut(&NewShortcut::new("A", "/a/a.exe")).unwrap();
        assert!(backup::latest_backup(store.path()).is_none());

        let before = fs::read(store.path()).unwrap();
        store.create_shortcut(&NewShortcut::new("B", "/b/b.exe")).unwrap();
        let backup = backup::latest_backup(store.path()).unwrap();
        assert_eq!(fs::read(backup).unwrap(), before);
    }

    #[test]
    fn icon_prefers_grid_tall() {
        let tmp = tempfile::tempdir().unwrap();
        let icons = tmp.path().join("SteamIcons");
        fs::create_dir_all(&icons).unwrap();
        fs::write(icons.join("a.png"), b"").unwrap();
        fs::write(icons.join("grid-tall.png"), b"").unwrap();

        let exe = tmp.path().join("ModOrganizer.exe");
        assert_eq!(find_icon(&exe), icons.join("grid-tall.png").to_string_lossy());

        fs::remove_file(icons.join("grid-tall.png")).unwrap();
        fs::write(icons.join("b.png"), b"").unwrap();
        fs::write(icons.join("readme.txt"), b"").unwrap();
        assert_eq!(find_icon(&exe), icons.join("a.png").to_string_lossy());
    }

    #[test]
    fn icon_empty_without_steam_icons() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(find_icon(&tmp.path().join("game.exe")), "");
    }

    fn write_root(path: &Path, shortcuts: VdfObject) {
        let mut root = VdfObject::new();
        root.push("shortcuts", shortcuts);
        fs::write(path, vdf::encode_binary(&root)).unwrap();
    }

    #[test]
    fn highest_possible_index_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut old = VdfObject::new();
        old.push("AppName", "Old");
        let mut shortcuts = VdfObject::new();
        shortcuts.push(u32::MAX.to_string(), old);
        let mut store = store_in(tmp.path());
        write_root(store.path(), shortcuts);
        let before = fs::read(store.path()).unwrap();

        let err = store
            .create_shortcut(&NewShortcut::new("New", "/n/n.exe"))
            .unwrap_err();
        assert!(matches!(err, SteamError::Vdf(_)), "{err}");
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn empty_tags_fall_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store
            .create_shortcut(&NewShortcut::new("A", "/a/a.exe").with_tags(Vec::new()))
            .unwrap();
        assert_eq!(store.shortcuts().unwrap()[0].tags, vec![DEFAULT_TAG.to_string()]);
    }

    #[test]
    fn non_utf8_neighbours_survive_a_create() {
        let tmp = tempfile::tempdir().unwrap();
        let mut other = VdfObject::new();
        other.push("appid", -200_000_000);
        other.push("AppName", VdfValue::Bytes(b"Caf\xe9".to_vec()));
        let mut shortcuts = VdfObject::new();
        shortcuts.push("0", other);
        let mut store = store_in(tmp.path());
        write_root(store.path(), shortcuts);

        store.create_shortcut(&NewShortcut::new("B", "/b/b.exe")).unwrap();

        let data = fs::read(store.path()).unwrap();
        assert!(data.windows(5).any(|w| w == b"Caf\xe9\x00"));
        assert_eq!(store.shortcuts().unwrap()[0].app_name, "Caf\u{fffd}");
    }

    #[test]
    fn replace_removes_and_appends_in_one_write() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(tmp.path());
        store.create_shortcut(&NewShortcut::new("Modlist", "/m/old.exe")).unwrap();
        store.create_shortcut(&NewShortcut::new("Other", "/o/o.exe")).unwrap();

        let created = store
            .replace_shortcut(&NewShortcut::new(" modlist ", "/m/new.exe"))
            .unwrap();
        assert_eq!(created.index, 1);

        let all = store.shortcuts().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!((all[0].index.as_str(), all[0].app_name.as_str()), ("0", "Other"));
        assert_eq!(all[1].exe_path(), "/m/new.exe");
    }

    #[test]
    fn failed_replace_keeps_old_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ShortcutStore::new(tmp.path().join("shortcuts.vdf"))
            .with_allocator(Scripted(VecDeque::from([-5, -1])));
        store.create_shortcut(&NewShortcut::new("A", "/a/a.exe")).unwrap();
        store.create_shortcut(&NewShortcut::new("B", "/b/b.exe")).unwrap();
        let before = fs::read(store.path()).unwrap();

        // Every further allocation returns -1, which B already holds.
        let err = store
            .replace_shortcut(&NewShortcut::new("A", "/a/new.exe"))
            .unwrap_err();
        assert!(matches!(err, SteamError::AppIdCollision(_)));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }
}
