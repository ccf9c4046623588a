//! Rendering of JavaScript literals embedded in the emitted parser.
//!
//! The emitted code indexes strings in UTF-16 code units, so every length
//! and escape here is computed over UTF-16 rather than chars or bytes.

use crate::ast::{CharClass, ClassPart};

/// The number of UTF-16 code units `input.substr` and `pos` arithmetic see.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Renders a double-quoted JavaScript string literal.
///
/// Backslash, the quote, tab, line feed, form feed and carriage return get
/// two-character escapes; everything else outside `0x20..=0x7F` becomes
/// `\xHH` (code unit <= 0xFF) or `\uHHHH`, uppercase hex. Supplementary
/// characters are emitted as their two surrogate units.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{000C}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            _ if (ch as u32) < 0x20 || (ch as u32) > 0x7F => escape_into(&mut out, ch),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Renders the regex literal `/^[...]/` the class snippet tests a single
/// character against. The empty class becomes `[]` (never matches) and the
/// empty inverted class `[^]` (matches anything), which is exactly the
/// matching behavior the operators call for.
pub fn class_regex(class: &CharClass) -> String {
    let mut out = String::from("/^[");
    if class.inverted {
        out.push('^');
    }
    for part in &class.parts {
        match *part {
            ClassPart::Single(ch) => push_class_char(&mut out, ch),
            ClassPart::Range(lo, hi) => {
                push_class_char(&mut out, lo);
                out.push('-');
                push_class_char(&mut out, hi);
            }
        }
    }
    out.push_str("]/");
    out
}

fn push_class_char(out: &mut String, ch: char) {
    match ch {
        '\\' | ']' | '^' | '-' | '/' => {
            out.push('\\');
            out.push(ch);
        }
        _ if (ch as u32) < 0x20 || (ch as u32) > 0x7F => escape_into(out, ch),
        _ => out.push(ch),
    }
}

fn escape_into(out: &mut String, ch: char) {
    let mut units = [0u16; 2];
    for &unit in ch.encode_utf16(&mut units).iter() {
        if unit <= 0xFF {
            out.push_str(&format!("\\x{unit:02X}"));
        } else {
            out.push_str(&format!("\\u{unit:04X}"));
        }
    }
}
