//! tmux-style key identifiers (`C-b`, `M-x`, `Escape`, `[`) and the raw byte
//! sequences they stand for on the remote pty.

use std::fmt;

const ESC: u8 = 0x1b;

/// Raw bytes written to the remote session for one key press.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeySequence(Vec<u8>);

impl KeySequence {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn starts_with_escape(&self) -> bool {
        self.0.first() == Some(&ESC)
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            match byte {
                0x20..=0x7e => write!(f, "{}", *byte as char)?,
                other => write!(f, "\\x{other:02x}")?,
            }
        }
        Ok(())
    }
}

/// Parses a key identifier. Returns `None` for empty or unrecognised names.
pub fn parse_key(value: &str) -> Option<KeySequence> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut meta = false;
    let mut control = false;
    let mut rest = trimmed;
    loop {
        if let Some(tail) = strip_modifier(rest, 'C') {
            if control {
                return None;
            }
            control = true;
            rest = tail;
        } else if let Some(tail) = strip_modifier(rest, 'M') {
            if meta {
                return None;
            }
            meta = true;
            rest = tail;
        } else {
            break;
        }
    }

    let mut bytes = Vec::new();
    if meta {
        bytes.push(ESC);
    }

    let lower = rest.to_ascii_lowercase();
    let named: Option<&[u8]> = match lower.as_str() {
        "escape" | "esc" => Some(&[ESC]),
        "enter" | "return" => Some(b"\n"),
        "tab" => Some(b"\t"),
        "space" => Some(b" "),
        "bspace" | "backspace" => Some(&[0x7f]),
        "pageup" | "ppage" => Some(b"\x1b[5~"),
        "pagedown" | "npage" => Some(b"\x1b[6~"),
        "home" => Some(b"\x1b[H"),
        "end" => Some(b"\x1b[F"),
        "up" => Some(b"\x1b[A"),
        "down" => Some(b"\x1b[B"),
        _ => None,
    };

    if let Some(seq) = named {
        if control {
            return None;
        }
        bytes.extend_from_slice(seq);
        return Some(KeySequence(bytes));
    }

    let mut chars = rest.chars();
    let ch = chars.next()?;
    if chars.next().is_some() || !ch.is_ascii() {
        return None;
    }

    if control {
        bytes.push(control_byte(ch)?);
    } else {
        bytes.push(ch as u8);
    }
    Some(KeySequence(bytes))
}

/// A cancel key is only usable when it cannot be mistaken for the start of an
/// escape sequence by a shell that is not in copy mode.
pub fn validate_cancel_key(value: &str) -> Result<KeySequence, String> {
    if value.trim().is_empty() {
        return Err("cancel key is empty".to_string());
    }
    let seq = parse_key(value).ok_or_else(|| format!("cancel key '{value}' is not recognised"))?;
    if seq.starts_with_escape() {
        return Err(format!("cancel key '{value}' begins with an escape byte"));
    }
    Ok(seq)
}

fn strip_modifier(value: &str, modifier: char) -> Option<&str> {
    let mut chars = value.chars();
    let first = chars.next()?;
    if first != modifier || chars.next() != Some('-') {
        return None;
    }
    let tail = &value[2..];
    if tail.is_empty() {
        None
    } else {
        Some(tail)
    }
}

fn control_byte(ch: char) -> Option<u8> {
    let lower = ch.to_ascii_lowercase();
    match lower {
        'a'..='z' => Some(lower as u8 - b'a' + 1),
        '@' | ' ' => Some(0x00),
        '[' => Some(ESC),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}
