//! Command metadata: mnemonic <-> opcode byte, argument widths, prefix
//! bytes, and which argument positions carry ROM pointers.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// What a pointer-carrying argument points at. Also selects how the
/// decompiler walks a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Script,
    Text,
    Movs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDesc {
    /// Opcode byte.
    pub byte: u8,
    /// Byte width of each argument, in order.
    #[serde(default)]
    pub args: Vec<u8>,
    /// Fixed bytes emitted between the opcode byte and the first argument.
    #[serde(default)]
    pub prefix: Vec<u8>,
    /// (argument index, target kind) for pointer-carrying arguments.
    #[serde(default)]
    pub pointers: Vec<(usize, RegionKind)>,
}

impl CommandDesc {
    pub fn new(byte: u8, args: &[u8]) -> Self {
        Self {
            byte,
            args: args.to_vec(),
            prefix: Vec::new(),
            pointers: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn with_pointer(mut self, arg: usize, kind: RegionKind) -> Self {
        self.pointers.push((arg, kind));
        self
    }

    /// Target kind of the pointer at argument `arg`, if any.
    pub fn pointer_kind(&self, arg: usize) -> Option<RegionKind> {
        self.pointers
            .iter()
            .find(|(i, _)| *i == arg)
            .map(|(_, k)| *k)
    }

    /// Encoded size: opcode byte + prefix + argument bytes.
    pub fn size(&self) -> usize {
        1 + self.prefix.len() + self.args.iter().map(|w| *w as usize).sum::<usize>()
    }
}

/// Forward (mnemonic -> desc) and reverse (byte -> mnemonic) command table.
pub struct CommandTable {
    by_name: HashMap<String, CommandDesc>,
    by_byte: HashMap<u8, String>,
    aliases: HashMap<&'static str, &'static str>,
}

impl CommandTable {
    fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_byte: HashMap::new(),
            aliases: HashMap::from([("goto", "jump")]),
        }
    }

    pub fn insert(&mut self, name: &str, desc: CommandDesc) {
        self.by_byte.entry(desc.byte).or_insert_with(|| name.to_string());
        self.by_name.insert(name.to_string(), desc);
    }

    /// Look up a mnemonic, following aliases.
    pub fn get(&self, name: &str) -> Option<&CommandDesc> {
        let name = self.aliases.get(name).copied().unwrap_or(name);
        self.by_name.get(name)
    }

    pub fn resolve_alias<'a>(&self, name: &'a str) -> &'a str {
        self.aliases.get(name).copied().unwrap_or(name)
    }

    /// Reverse lookup for decoding.
    pub fn mnemonic(&self, byte: u8) -> Option<&str> {
        self.by_byte.get(&byte).map(String::as_str)
    }

    /// Replace the table with one loaded from JSON
    /// (`{ "mnemonic": { "byte": …, "args": […], … }, … }`).
    pub fn from_json(text: &str) -> Result<Self> {
        let map: HashMap<String, CommandDesc> = serde_json::from_str(text)?;
        let mut table = Self::empty();
        for (name, desc) in map {
            table.insert(&name, desc);
        }
        Ok(table)
    }

    /// Built-in table for the event bytecode.
    pub fn builtin() -> Self {
        use RegionKind::*;
        let mut t = Self::empty();
        t.insert("nop", CommandDesc::new(0x00, &[]));
        t.insert("nop1", CommandDesc::new(0x01, &[]));
        t.insert("end", CommandDesc::new(0x02, &[]));
        t.insert("return", CommandDesc::new(0x03, &[]));
        t.insert("call", CommandDesc::new(0x04, &[4]).with_pointer(0, Script));
        t.insert("jump", CommandDesc::new(0x05, &[4]).with_pointer(0, Script));
        t.insert("jumpif", CommandDesc::new(0x06, &[1, 4]).with_pointer(1, Script));
        t.insert("callif", CommandDesc::new(0x07, &[1, 4]).with_pointer(1, Script));
        t.insert("jumpstd", CommandDesc::new(0x08, &[1]));
        t.insert("callstd", CommandDesc::new(0x09, &[1]));
        t.insert("jumpstdif", CommandDesc::new(0x0A, &[1, 1]));
        t.insert("callstdif", CommandDesc::new(0x0B, &[1, 1]));
        t.insert("killscript", CommandDesc::new(0x0D, &[]));
        // msgbox is the pointer-loading half of the message macro; the bank
        // byte is a fixed prefix.
        t.insert(
            "msgbox",
            CommandDesc::new(0x0F, &[4])
                .with_prefix(&[0x00])
                .with_pointer(0, Text),
        );
        t.insert("setvar", CommandDesc::new(0x16, &[2, 2]));
        t.insert("addvar", CommandDesc::new(0x17, &[2, 2]));
        t.insert("subvar", CommandDesc::new(0x18, &[2, 2]));
        t.insert("compare", CommandDesc::new(0x21, &[2, 2]));
        t.insert("callasm", CommandDesc::new(0x23, &[4]));
        t.insert("pause", CommandDesc::new(0x28, &[2]));
        t.insert("setflag", CommandDesc::new(0x29, &[2]));
        t.insert("clearflag", CommandDesc::new(0x2A, &[2]));
        t.insert("checkflag", CommandDesc::new(0x2B, &[2]));
        t.insert(
            "applymovement",
            CommandDesc::new(0x4F, &[2, 4]).with_pointer(1, Movs),
        );
        t.insert("waitmovement", CommandDesc::new(0x51, &[2]));
        t.insert("faceplayer", CommandDesc::new(0x5A, &[]));
        t.insert("waitmsg", CommandDesc::new(0x66, &[]));
        t.insert("message", CommandDesc::new(0x67, &[4]).with_pointer(0, Text));
        t.insert("lock", CommandDesc::new(0x6A, &[]));
        t.insert("release", CommandDesc::new(0x6C, &[]));
        t
    }
}
