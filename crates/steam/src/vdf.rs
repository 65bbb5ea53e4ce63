//! Binary VDF ("KeyValues") codec used by `shortcuts.vdf`.
//!
//! A document is a stream of typed entries: a type byte, a null-terminated
//! key, then the payload for that type. Objects nest until a matching
//! [`VDF_TYPE_END`] byte. Entry order and duplicate keys are preserved so a
//! decode/encode round trip reproduces Steam's bytes exactly.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::SteamError;

/// Binary VDF type markers.
const VDF_TYPE_OBJECT: u8 = 0x00;
const VDF_TYPE_STRING: u8 = 0x01;
const VDF_TYPE_INT32: u8 = 0x02;
const VDF_TYPE_FLOAT32: u8 = 0x03;
const VDF_TYPE_UINT64: u8 = 0x07;
const VDF_TYPE_END: u8 = 0x08;

/// A single VDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum VdfValue {
    String(String),
    /// String payload that is not valid UTF-8, kept byte for byte.
    Bytes(Vec<u8>),
    Int32(i32),
    Float32(f32),
    UInt64(u64),
    Object(VdfObject),
}

impl VdfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw payload of either string form.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            VdfValue::String(s) => Some(s.as_bytes()),
            VdfValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Either string form, with invalid UTF-8 replaced for display.
    pub fn to_string_lossy(&self) -> Option<Cow<'_, str>> {
        match self {
            VdfValue::String(s) => Some(Cow::Borrowed(s)),
            VdfValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            VdfValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&VdfObject> {
        match self {
            VdfValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut VdfObject> {
        match self {
            VdfValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<&str> for VdfValue {
    fn from(s: &str) -> Self {
        VdfValue::String(s.to_string())
    }
}

impl From<String> for VdfValue {
    fn from(s: String) -> Self {
        VdfValue::String(s)
    }
}

impl From<i32> for VdfValue {
    fn from(v: i32) -> Self {
        VdfValue::Int32(v)
    }
}

impl From<VdfObject> for VdfValue {
    fn from(o: VdfObject) -> Self {
        VdfValue::Object(o)
    }
}

/// An ordered key-value mapping.
///
/// Lookups return the first entry with a matching key; `insert` replaces
/// that entry in place so untouched neighbours keep their position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VdfObject {
    entries: Vec<(String, VdfValue)>,
}

impl VdfObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Case-insensitive lookup. Steam is inconsistent about key casing
    /// (`AppName` vs `appname`, `MostRecent` vs `mostrecent`).
    pub fn get_ignore_case(&self, key: &str) -> Option<&VdfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut VdfValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_ignore_case(key).and_then(VdfValue::as_str)
    }

    pub fn get_object(&self, key: &str) -> Option<&VdfObject> {
        self.get_ignore_case(key).and_then(VdfValue::as_object)
    }

    pub fn get_object_mut(&mut self, key: &str) -> Option<&mut VdfObject> {
        self.get_mut(key).and_then(VdfValue::as_object_mut)
    }

    /// Sets `key`, replacing the first existing entry in place or
    /// appending a new one. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<VdfValue>) -> Option<VdfValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Appends an entry without checking for an existing key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<VdfValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Removes the first entry with `key`.
    pub fn remove(&mut self, key: &str) -> Option<VdfValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns the object under `key`, creating an empty one if the key is
    /// absent. Returns `None` if the key holds a non-object value.
    pub fn ensure_object(&mut self, key: &str) -> Option<&mut VdfObject> {
        if self.get(key).is_none() {
            self.entries
                .push((key.to_string(), VdfValue::Object(VdfObject::new())));
        }
        self.get_object_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VdfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn retain(&mut self, mut f: impl FnMut(&str, &VdfValue) -> bool) {
        self.entries.retain(|(k, v)| f(k, v));
    }

    pub(crate) fn into_entries(self) -> Vec<(String, VdfValue)> {
        self.entries
    }
}

impl FromIterator<(String, VdfValue)> for VdfObject {
    fn from_iter<I: IntoIterator<Item = (String, VdfValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Reads and decodes a binary VDF file.
pub fn load_binary(path: &Path) -> Result<VdfObject, SteamError> {
    let data = fs::read(path)
        .map_err(|e| SteamError::Io(format!("failed to read {}: {e}", path.display())))?;
    decode_binary(&data)
}

/// Decodes binary VDF data into its root object.
///
/// An empty input is an empty root; Steam ships zero-byte shortcut files.
pub fn decode_binary(data: &[u8]) -> Result<VdfObject, SteamError> {
    if data.is_empty() {
        return Ok(VdfObject::new());
    }

    let (root, pos) = read_object(data, 0)?;
    if pos != data.len() {
        return Err(SteamError::Vdf(format!(
            "{} trailing bytes after root object at pos {pos}",
            data.len() - pos
        )));
    }
    Ok(root)
}

/// Encodes a root object into binary VDF.
pub fn encode_binary(root: &VdfObject) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, root);
    out
}

/// Reads entries until the object's end marker. Returns the object and the
/// position just past the end marker.
fn read_object(data: &[u8], mut pos: usize) -> Result<(VdfObject, usize), SteamError> {
    let mut obj = VdfObject::new();

    loop {
        let Some(&type_byte) = data.get(pos) else {
            return Err(SteamError::Vdf(
                "unexpected end of data: object not closed".into(),
            ));
        };
        pos += 1;

        if type_byte == VDF_TYPE_END {
            return Ok((obj, pos));
        }

        let (key, new_pos) = read_string(data, pos)?;
        pos = new_pos;

        let value = match type_byte {
            VDF_TYPE_OBJECT => {
                let (child, new_pos) = read_object(data, pos)?;
                pos = new_pos;
                VdfValue::Object(child)
            }
            VDF_TYPE_STRING => {
                let (raw, new_pos) = read_bytes(data, pos)?;
                pos = new_pos;
                match String::from_utf8(raw) {
                    Ok(val) => VdfValue::String(val),
                    Err(e) => VdfValue::Bytes(e.into_bytes()),
                }
            }
            VDF_TYPE_INT32 => {
                let bytes = read_fixed::<4>(data, pos, &key)?;
                pos += 4;
                VdfValue::Int32(i32::from_le_bytes(bytes))
            }
            VDF_TYPE_FLOAT32 => {
                let bytes = read_fixed::<4>(data, pos, &key)?;
                pos += 4;
                VdfValue::Float32(f32::from_le_bytes(bytes))
            }
            VDF_TYPE_UINT64 => {
                let bytes = read_fixed::<8>(data, pos, &key)?;
                pos += 8;
                VdfValue::UInt64(u64::from_le_bytes(bytes))
            }
            _ => {
                return Err(SteamError::Vdf(format!(
                    "unknown type marker 0x{type_byte:02x} for key '{key}' at pos {pos}"
                )));
            }
        };

        obj.entries.push((key, value));
    }
}

fn read_fixed<const N: usize>(data: &[u8], pos: usize, key: &str) -> Result<[u8; N], SteamError> {
    data.get(pos..pos + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| SteamError::Vdf(format!("unexpected end of data reading '{key}'")))
}

/// Reads a null-terminated key starting at pos. Keys must be UTF-8.
fn read_string(data: &[u8], pos: usize) -> Result<(String, usize), SteamError> {
    let (raw, end) = read_bytes(data, pos)?;
    let s = String::from_utf8(raw)
        .map_err(|_| SteamError::Vdf(format!("key at pos {pos} is not valid UTF-8")))?;
    Ok((s, end))
}

/// Reads a null-terminated byte string starting at pos.
fn read_bytes(data: &[u8], pos: usize) -> Result<(Vec<u8>, usize), SteamError> {
    let Some(len) = data.get(pos..).and_then(|rest| rest.iter().position(|&b| b == 0x00)) else {
        return Err(SteamError::Vdf(format!(
            "unterminated string starting at pos {pos}"
        )));
    };
    Ok((data[pos..pos + len].to_vec(), pos + len + 1))
}

fn write_object(out: &mut Vec<u8>, obj: &VdfObject) {
    for (key, value) in obj.iter() {
        match value {
            VdfValue::Object(child) => {
                out.push(VDF_TYPE_OBJECT);
                write_string(out, key);
                write_object(out, child);
            }
            VdfValue::String(s) => {
                out.push(VDF_TYPE_STRING);
                write_string(out, key);
                write_string(out, s);
            }
            VdfValue::Bytes(b) => {
                out.push(VDF_TYPE_STRING);
                write_string(out, key);
                out.extend_from_slice(b);
                out.push(0x00);
            }
            VdfValue::Int32(v) => {
                out.push(VDF_TYPE_INT32);
                write_string(out, key);
                out.extend_from_slice(&v.to_le_bytes());
            }
            VdfValue::Float32(v) => {
                out.push(VDF_TYPE_FLOAT32);
                write_string(out, key);
                out.extend_from_slice(&v.to_le_bytes());
            }
            VdfValue::UInt64(v) => {
                out.push(VDF_TYPE_UINT64);
                write_string(out, key);
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out.push(VDF_TYPE_END);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0x00);
}
