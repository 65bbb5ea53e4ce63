//! `CompatToolMapping` maintenance in `config/config.vdf`.
//!
//! The file is edited as raw bytes: the mapping block is located by
//! brace matching and a child block is spliced in, so every byte outside
//! the touched block (including Steam's own whitespace and any non-UTF-8
//! content) is written back unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use crate::SteamError;
use crate::backup;
use crate::paths::Paths;
use crate::vdf_text;

const MAPPING_KEY: &str = "CompatToolMapping";
const STEAM_KEY: &str = "Steam";
const STEAM_SECTION_PATH: [&str; 4] = ["InstallConfigStore", "Software", "Valve", STEAM_KEY];

/// Priority Steam assigns to user-selected compatibility tools.
pub const MAPPING_PRIORITY: &str = "250";

/// What to do with an existing mapping for the same AppID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Remove existing entries for the AppID before inserting.
    #[default]
    Replace,
    /// Insert a second entry and leave the old one in place.
    Append,
}

/// Maps an AppID to a Proton build.
pub trait CompatToolMapper {
    /// Points `app_id` (unsigned form) at compatibility tool `tool`.
    fn set_compat_tool(&self, app_id: u32, tool: &str) -> Result<(), SteamError>;

    /// The tool currently mapped to `app_id`, if any.
    fn compat_tool_for(&self, app_id: u32) -> Result<Option<String>, SteamError>;
}

/// [`CompatToolMapper`] that splices text into `config.vdf`.
#[derive(Debug, Clone)]
pub struct TextSpliceMapper {
    config_path: PathBuf,
    policy: DuplicatePolicy,
}

impl TextSpliceMapper {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn for_paths(paths: &Paths) -> Self {
        Self::new(paths.config_vdf_path())
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read(&self) -> Result<Vec<u8>, SteamError> {
        fs::read(&self.config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SteamError::ConfigNotFound(self.config_path.clone())
            } else {
                tracing::error!(path = %self.config_path.display(), "failed to read config.vdf: {e}");
                SteamError::Io(format!(
                    "failed to read {}: {e}",
                    self.config_path.display()
                ))
            }
        })
    }
}

impl CompatToolMapper for TextSpliceMapper {
    fn set_compat_tool(&self, app_id: u32, tool: &str) -> Result<(), SteamError> {
        let data = self.read()?;
        let updated = splice_compat_mapping(&data, app_id, tool, self.policy)?;
        backup::backup_then_replace(&self.config_path, &updated)?;
        tracing::info!(
            app_id,
            tool,
            path = %self.config_path.display(),
            "set compatibility tool"
        );
        Ok(())
    }

    fn compat_tool_for(&self, app_id: u32) -> Result<Option<String>, SteamError> {
        let data = self.read()?;
        let root = vdf_text::decode_text(&String::from_utf8_lossy(&data))?;

        let steam = STEAM_SECTION_PATH
            .iter()
            .try_fold(&root, |obj, key| obj.get_object(key))
            .or_else(|| root.get_object(STEAM_KEY));

        Ok(steam
            .and_then(|s| s.get_object(MAPPING_KEY))
            .and_then(|m| m.get_object(&app_id.to_string()))
            .and_then(|e| e.get_str("name"))
            .map(str::to_string))
    }
}

/// Returns `data` with a `CompatToolMapping` entry for `app_id`.
///
/// A missing mapping block is created as the first child of the Steam
/// section.
pub fn splice_compat_mapping(
    data: &[u8],
    app_id: u32,
    tool: &str,
    policy: DuplicatePolicy,
) -> Result<Vec<u8>, SteamError> {
    let mut out = data.to_vec();
    let (steam_open, steam_close) = find_steam_section(&out)?;

    let mapping_open = match find_child(&out, steam_open + 1, steam_close, MAPPING_KEY) {
        Some(child) if child.is_block => child.value_start,
        Some(_) => return Err(SteamError::MalformedSection(MAPPING_KEY.into())),
        None => {
            tracing::info!("CompatToolMapping missing, creating it");
            let indent = tabs(indent_of(&out, steam_open) + 1);
            let block = format!("\n{indent}\"{MAPPING_KEY}\"\n{indent}{{\n{indent}}}");
            let at = steam_open + 1;
            out.splice(at..at, block.bytes());

            let steam_close = block_end(&out, steam_open)
                .ok_or_else(|| SteamError::MalformedSection(STEAM_KEY.into()))?;
            find_child(&out, steam_open + 1, steam_close, MAPPING_KEY)
                .map(|c| c.value_start)
                .ok_or_else(|| SteamError::MalformedSection(MAPPING_KEY.into()))?
        }
    };

    let key = app_id.to_string();
    if policy == DuplicatePolicy::Replace {
        loop {
            let close = mapping_close(&out, mapping_open)?;
            let Some(existing) = find_child(&out, mapping_open + 1, close, &key) else {
                break;
            };
            tracing::debug!(app_id, "removing existing mapping");
            remove_child(&mut out, &existing);
        }
    }

    let close = mapping_close(&out, mapping_open)?;
    let e = tabs(indent_of(&out, mapping_open) + 1);
    let tool = tool.replace('\\', "\\\\").replace('"', "\\\"");
    let entry = format!(
        "{e}\"{key}\"\n{e}{{\n{e}\t\"name\"\t\t\"{tool}\"\n{e}\t\"config\"\t\t\"\"\n{e}\t\"priority\"\t\t\"{MAPPING_PRIORITY}\"\n{e}}}\n"
    );

    let line = line_start(&out, close);
    if is_blank(&out[line..close]) {
        out.splice(line..line, entry.bytes());
    } else {
        let entry = format!("\n{entry}");
        out.splice(close..close, entry.bytes());
    }

    Ok(out)
}

fn mapping_close(data: &[u8], open: usize) -> Result<usize, SteamError> {
    block_end(data, open).ok_or_else(|| SteamError::MalformedSection(MAPPING_KEY.into()))
}

/// Locates the Steam section's braces, preferring the canonical
/// `InstallConfigStore/Software/Valve/Steam` path.
fn find_steam_section(data: &[u8]) -> Result<(usize, usize), SteamError> {
    let mut range = (0, data.len());
    let mut open = None;
    for key in STEAM_SECTION_PATH {
        match find_child(data, range.0, range.1, key) {
            Some(child) if child.is_block => {
                range = (child.value_start + 1, child.value_end - 1);
                open = Some(child.value_start);
            }
            _ => {
                open = None;
                break;
            }
        }
    }

    let open = match open {
        Some(open) => open,
        None => find_any_block(data, STEAM_KEY)
            .ok_or_else(|| SteamError::SectionNotFound(STEAM_KEY.into()))?,
    };

    match block_end(data, open) {
        Some(close) => Ok((open, close)),
        None => {
            // Report the innermost unbalanced block we know about.
            let culprit = match find_any_block(data, MAPPING_KEY) {
                Some(m) if block_end(data, m).is_none() => MAPPING_KEY,
                _ => STEAM_KEY,
            };
            Err(SteamError::MalformedSection(culprit.into()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    /// `start..end` spans the token including quotes; `text` excludes them.
    Str {
        start: usize,
        end: usize,
        text_start: usize,
        text_end: usize,
    },
}

/// Next token at or after `pos`, never reading at or past `limit`.
fn next_token(data: &[u8], mut pos: usize, limit: usize) -> Option<(Token, usize)> {
    while pos < limit {
        match data[pos] {
            b if b.is_ascii_whitespace() => pos += 1,
            b'/' if pos + 1 < limit && data[pos + 1] == b'/' => {
                while pos < limit && data[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'[' => {
                while pos < limit && data[pos] != b']' {
                    pos += 1;
                }
                pos += 1;
            }
            b'{' => return Some((Token::Open(pos), pos + 1)),
            b'}' => return Some((Token::Close(pos), pos + 1)),
            b'"' => {
                let start = pos;
                pos += 1;
                while pos < limit && data[pos] != b'"' {
                    pos += if data[pos] == b'\\' { 2 } else { 1 };
                }
                if pos >= limit {
                    return None;
                }
                let token = Token::Str {
                    start,
                    end: pos + 1,
                    text_start: start + 1,
                    text_end: pos,
                };
                return Some((token, pos + 1));
            }
            _ => {
                let start = pos;
                while pos < limit
                    && !data[pos].is_ascii_whitespace()
                    && !matches!(data[pos], b'{' | b'}' | b'"')
                {
                    pos += 1;
                }
                let token = Token::Str {
                    start,
                    end: pos,
                    text_start: start,
                    text_end: pos,
                };
                return Some((token, pos));
            }
        }
    }
    None
}

/// Position of the `}` matching the `{` at `open`.
fn block_end(data: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = open;
    while let Some((token, next)) = next_token(data, pos, data.len()) {
        match token {
            Token::Open(_) => depth += 1,
            Token::Close(at) => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(at);
                }
            }
            Token::Str { .. } => {}
        }
        pos = next;
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct Child {
    key_start: usize,
    value_start: usize,
    /// One past the value (past the `}` for blocks).
    value_end: usize,
    is_block: bool,
}

/// Finds a direct child `key` among the entries in `from..to`.
fn find_child(data: &[u8], from: usize, to: usize, key: &str) -> Option<Child> {
    let mut pos = from;
    loop {
        let (token, next) = next_token(data, pos, to)?;
        let Token::Str {
            start: key_start,
            text_start,
            text_end,
            ..
        } = token
        else {
            return None;
        };

        let (value, after) = next_token(data, next, to)?;
        let child = match value {
            Token::Open(at) => Child {
                key_start,
                value_start: at,
                value_end: block_end(data, at)? + 1,
                is_block: true,
            },
            Token::Str { start, end, .. } => Child {
                key_start,
                value_start: start,
                value_end: end,
                is_block: false,
            },
            Token::Close(_) => return None,
        };

        if data[text_start..text_end].eq_ignore_ascii_case(key.as_bytes()) {
            return Some(child);
        }
        pos = if child.is_block { child.value_end } else { after };
    }
}

/// First `key` anywhere in the document that opens a block.
fn find_any_block(data: &[u8], key: &str) -> Option<usize> {
    let mut pos = 0;
    let mut prev_matches = false;
    while let Some((token, next)) = next_token(data, pos, data.len()) {
        match token {
            Token::Open(at) if prev_matches => return Some(at),
            Token::Str {
                text_start,
                text_end,
                ..
            } => prev_matches = data[text_start..text_end].eq_ignore_ascii_case(key.as_bytes()),
            _ => prev_matches = false,
        }
        pos = next;
    }
    None
}

/// Deletes a child entry, taking its whole lines when it sits alone on them.
fn remove_child(out: &mut Vec<u8>, child: &Child) {
    let line = line_start(out, child.key_start);
    let start = if is_blank(&out[line..child.key_start]) {
        line
    } else {
        child.key_start
    };

    let mut end = child.value_end;
    let mut scan = end;
    while scan < out.len() && matches!(out[scan], b' ' | b'\t' | b'\r') {
        scan += 1;
    }
    if scan < out.len() && out[scan] == b'\n' {
        end = scan + 1;
    }

    out.drain(start..end);
}

fn line_start(data: &[u8], pos: usize) -> usize {
    data[..pos]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1)
}

fn indent_of(data: &[u8], pos: usize) -> usize {
    data[line_start(data, pos)..]
        .iter()
        .take_while(|&&b| b == b'\t')
        .count()
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == b' ' || b == b'\t' || b == b'\r')
}

fn tabs(n: usize) -> String {
    "\t".repeat(n)
}
