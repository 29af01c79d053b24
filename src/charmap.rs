//! Table-driven text codec for the ROM's character encoding. `0xFF` is the
//! terminator and never appears inside an encoded body.

use std::collections::HashMap;

use crate::error::Error;

pub const TERMINATOR: u8 = 0xFF;

/// Multi-character escape sequences come first so they win over a literal
/// backslash during encoding.
const ESCAPES: &[(&str, u8)] = &[("\\n", 0xFE), ("\\p", 0xFB), ("\\l", 0xFA)];

const PUNCT: &[(char, u8)] = &[
    (' ', 0x00),
    ('&', 0x2D),
    ('+', 0x2E),
    ('=', 0x35),
    ('!', 0xAB),
    ('?', 0xAC),
    ('.', 0xAD),
    ('-', 0xAE),
    ('\u{2026}', 0xB0), // ellipsis
    ('"', 0xB1),
    ('\'', 0xB3),
    ('\u{2642}', 0xB5), // male sign
    ('\u{2640}', 0xB6), // female sign
    (',', 0xB8),
    ('/', 0xBA),
    (':', 0xF0),
];

pub struct Charmap {
    enc: HashMap<char, u8>,
    dec: HashMap<u8, char>,
}

impl Charmap {
    pub fn builtin() -> Self {
        let mut enc = HashMap::new();
        for (i, c) in ('0'..='9').enumerate() {
            enc.insert(c, 0xA1 + i as u8);
        }
        for (i, c) in ('A'..='Z').enumerate() {
            enc.insert(c, 0xBB + i as u8);
        }
        for (i, c) in ('a'..='z').enumerate() {
            enc.insert(c, 0xD5 + i as u8);
        }
        for &(c, b) in PUNCT {
            enc.insert(c, b);
        }
        let dec = enc.iter().map(|(&c, &b)| (b, c)).collect();
        Self { enc, dec }
    }

    /// Encode a text body. Escape sequences (`\n`, `\p`, `\l`, `\xNN`) map
    /// to their control bytes; everything else goes through the table.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(text.len());
        let mut rest = text;
        'outer: while !rest.is_empty() {
            for &(esc, byte) in ESCAPES {
                if let Some(tail) = rest.strip_prefix(esc) {
                    out.push(byte);
                    rest = tail;
                    continue 'outer;
                }
            }
            if let Some(tail) = rest.strip_prefix("\\x") {
                let hex = tail.get(..2).ok_or(Error::Unencodable { ch: '\\' })?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| Error::Unencodable { ch: '\\' })?;
                if byte == TERMINATOR {
                    return Err(Error::TerminatorInText);
                }
                out.push(byte);
                rest = &tail[2..];
                continue;
            }
            let ch = rest.chars().next().unwrap();
            let byte = *self.enc.get(&ch).ok_or(Error::Unencodable { ch })?;
            out.push(byte);
            rest = &rest[ch.len_utf8()..];
        }
        Ok(out)
    }

    /// Decode a body (terminator excluded). Unknown bytes become `\xNN`
    /// escapes so the output stays encodable.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        for &b in bytes {
            if let Some(&c) = self.dec.get(&b) {
                out.push(c);
            } else if let Some(&(esc, _)) = ESCAPES.iter().find(|&&(_, eb)| eb == b) {
                out.push_str(esc);
            } else {
                out.push_str(&format!("\\x{b:02x}"));
            }
        }
        out
    }
}
