//! Text VDF codec for `loginusers.vdf`, `libraryfolders.vdf` and read-only
//! views of `config.vdf`.
//!
//! Values are always strings; nested objects use braces. Comments (`//`)
//! and platform conditionals (`[$WIN32]`) are skipped on read.

use std::fs;
use std::path::Path;

use crate::SteamError;
use crate::vdf::{VdfObject, VdfValue};

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
}

/// Reads and decodes a text VDF file.
pub fn load_text(path: &Path) -> Result<VdfObject, SteamError> {
    let bytes = fs::read(path)
        .map_err(|e| SteamError::Io(format!("failed to read {}: {e}", path.display())))?;
    decode_text(&String::from_utf8_lossy(&bytes))
}

/// Decodes text VDF into its root object.
pub fn decode_text(input: &str) -> Result<VdfObject, SteamError> {
    let tokens = tokenize(input)?;
    let mut iter = tokens.into_iter();
    parse_entries(&mut iter, false)
}

/// Encodes an object as text VDF using Steam's layout: tab indentation and
/// two tabs between a key and its value.
pub fn encode_text(root: &VdfObject) -> String {
    let mut out = String::new();
    write_entries(&mut out, root, 0);
    out
}

fn tokenize(input: &str) -> Result<Vec<Token>, SteamError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        match c {
            '{' => tokens.push(Token::Open),
            '}' => tokens.push(Token::Close),
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut s = String::new();
                let mut closed = false;
                while let Some(next) = chars.next() {
                    match next {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(escaped) => s.push(escaped),
                            None => break,
                        },
                        other => s.push(other),
                    }
                }
                if !closed {
                    return Err(SteamError::Vdf("unterminated quoted string".into()));
                }
                tokens.push(Token::Str(s));
            }
            '[' => {
                // Platform conditional such as [$WIN32]; not meaningful here.
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                }
            }
            _ => {
                let mut s = c.to_string();
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '{' || next == '}' || next == '"' {
                        break;
                    }
                    s.push(next);
                    chars.next();
                }
                tokens.push(Token::Str(s));
            }
        }
    }

    Ok(tokens)
}

fn parse_entries(
    tokens: &mut impl Iterator<Item = Token>,
    nested: bool,
) -> Result<VdfObject, SteamError> {
    let mut obj = VdfObject::new();

    loop {
        match tokens.next() {
            None if nested => {
                return Err(SteamError::Vdf("unexpected end of input: object not closed".into()));
            }
            None => return Ok(obj),
            Some(Token::Close) if nested => return Ok(obj),
            Some(Token::Close) => {
                return Err(SteamError::Vdf("unexpected '}' at top level".into()));
            }
            Some(Token::Open) => {
                return Err(SteamError::Vdf("'{' without a preceding key".into()));
            }
            Some(Token::Str(key)) => match tokens.next() {
                Some(Token::Open) => {
                    let child = parse_entries(tokens, true)?;
                    obj.push(key, child);
                }
                Some(Token::Str(value)) => obj.push(key, value),
                Some(Token::Close) | None => {
                    return Err(SteamError::Vdf(format!("missing value for key '{key}'")));
                }
            },
        }
    }
}

fn write_entries(out: &mut String, obj: &VdfObject, depth: usize) {
    let indent = "\t".repeat(depth);
    for (key, value) in obj.iter() {
        let key = escape(key);
        match value {
            VdfValue::Object(child) => {
                out.push_str(&format!("{indent}\"{key}\"\n{indent}{{\n"));
                write_entries(out, child, depth + 1);
                out.push_str(&format!("{indent}}}\n"));
            }
            VdfValue::String(s) => {
                out.push_str(&format!("{indent}\"{key}\"\t\t\"{}\"\n", escape(s)));
            }
            VdfValue::Bytes(b) => {
                let s = String::from_utf8_lossy(b);
                out.push_str(&format!("{indent}\"{key}\"\t\t\"{}\"\n", escape(&s)));
            }
            VdfValue::Int32(v) => out.push_str(&format!("{indent}\"{key}\"\t\t\"{v}\"\n")),
            VdfValue::Float32(v) => out.push_str(&format!("{indent}\"{key}\"\t\t\"{v}\"\n")),
            VdfValue::UInt64(v) => out.push_str(&format!("{indent}\"{key}\"\t\t\"{v}\"\n")),
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
