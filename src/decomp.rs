//! Worklist-driven decompiler: walks the ROM from a seed address,
//! reconstructing script text and discovering further regions through
//! pointer-carrying arguments. Failures are deliberately soft; an
//! unrecognized byte degrades to `#raw` so the output stays reversible.

use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;

use tracing::debug;

use crate::charmap::{Charmap, TERMINATOR};
use crate::commands::{CommandTable, RegionKind};
use crate::rom::{file_offset, Rom};

/// Presentation width for re-wrapped text regions.
const TEXT_WRAP: usize = 80;
/// Terminators for movement data.
const MOVS_END: &[u8] = &[0xFE, 0xFF];

#[derive(Debug, Clone)]
pub struct DecompileOptions {
    /// Mnemonics that end linear decoding.
    pub end_mnemonics: Vec<String>,
    /// Raw byte values that end linear decoding.
    pub end_bytes: Vec<u8>,
    /// Stop after this many consecutive zero bytes; 0 disables the guard.
    pub max_nops: u32,
    /// 1 appends instruction bytes, 2 also appends addresses.
    pub verbosity: u8,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            end_mnemonics: vec!["end".into(), "jump".into(), "return".into()],
            end_bytes: vec![0xFF],
            max_nops: 10,
            verbosity: 0,
        }
    }
}

/// Decode one script region. Returns its text and the discovered
/// (pointer, kind) pairs, unmasked.
fn decode_script_region(
    rom: &Rom,
    addr: u32,
    table: &CommandTable,
    opts: &DecompileOptions,
) -> (String, Vec<(u32, RegionKind)>) {
    let mut out = String::new();
    let mut found = Vec::new();
    let mut i = file_offset(addr) as usize;
    let mut nop_run = 0u32;

    // A region that opens on a terminal byte decodes to nothing.
    match rom.get(i) {
        Some(b) if opts.end_bytes.contains(&b) => return (out, found),
        None => return (out, found),
        _ => {}
    }

    loop {
        let Some(byte) = rom.get(i) else { break };
        let start = i;
        let mut mnemonic = "";
        if let Some(mn) = table.mnemonic(byte) {
            mnemonic = mn;
            let desc = table.get(mn).expect("reverse entry");
            out.push_str(mn);
            i += 1 + desc.prefix.len();
            for (n, &width) in desc.args.iter().enumerate() {
                let mut value = 0u32;
                for k in 0..width as usize {
                    value |= u32::from(rom.get(i + k).unwrap_or(0)) << (8 * k);
                }
                if let Some(kind) = desc.pointer_kind(n) {
                    found.push((value, kind));
                }
                let _ = write!(out, " {value:#x}");
                i += width as usize;
            }
        } else {
            let _ = write!(out, "#raw {byte:#x}");
            i += 1;
        }

        let mut truncated = false;
        if byte == 0 {
            nop_run += 1;
            if opts.max_nops != 0 && nop_run >= opts.max_nops {
                out.push_str(" ' Too many nops. Stopping");
                truncated = true;
            }
        } else {
            nop_run = 0;
        }

        if opts.verbosity >= 1 {
            out.push_str(" //");
            for k in start..i {
                let _ = write!(out, " {:02x}", rom.get(k).unwrap_or(0));
            }
            if opts.verbosity >= 2 {
                let _ = write!(out, " -  {start:#x}");
            }
        }
        out.push('\n');

        if truncated
            || opts.end_mnemonics.iter().any(|m| m == mnemonic)
            || opts.end_bytes.contains(&byte)
        {
            break;
        }
    }
    (out, found)
}

/// Decode a text region: scan to the terminator, decode, and re-wrap into
/// fixed-width literal lines.
fn decode_text_region(rom: &Rom, addr: u32, charmap: &Charmap) -> String {
    let start = (file_offset(addr) as usize).min(rom.bytes.len());
    let mut end = start;
    while let Some(b) = rom.get(end) {
        if b == TERMINATOR {
            break;
        }
        end += 1;
    }
    let text = charmap.decode(&rom.bytes[start..end]);
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    for line in chars.chunks(TEXT_WRAP) {
        out.push_str("= ");
        out.extend(line.iter());
        out.push('\n');
    }
    out
}

/// Byte-for-byte dump up to and including the nearest terminator.
fn decode_movs_region(rom: &Rom, addr: u32) -> String {
    let mut out = String::new();
    let mut i = file_offset(addr) as usize;
    while let Some(b) = rom.get(i) {
        let _ = writeln!(out, "#raw {b:#x}");
        i += 1;
        if MOVS_END.contains(&b) {
            break;
        }
    }
    out
}

/// Decompile from a seed. The worklist is seeded with `(seed, kind)`; each
/// script region may discover more. The seen-set is checked at enqueue
/// time, so one block is emitted per address per run and self-referential
/// targets terminate.
pub fn decompile(
    rom: &Rom,
    seed: u32,
    kind: RegionKind,
    table: &CommandTable,
    charmap: &Charmap,
    opts: &DecompileOptions,
) -> String {
    let mut queue: VecDeque<(u32, RegionKind)> = VecDeque::new();
    let mut seen: HashSet<u32> = HashSet::new();
    queue.push_back((seed, kind));
    seen.insert(seed);

    let mut out = String::new();
    while let Some((addr, kind)) = queue.pop_front() {
        debug!(addr = format_args!("{addr:#x}"), ?kind, "decompiling region");
        match kind {
            RegionKind::Script => {
                let (body, discovered) = decode_script_region(rom, addr, table, opts);
                let _ = write!(out, "#org {addr:#x}\n{body}\n");
                for (value, kind) in discovered {
                    let masked = value & 0xFF_FFFF;
                    if seen.insert(masked) {
                        queue.push_back((masked, kind));
                    }
                }
            }
            RegionKind::Text => {
                let body = decode_text_region(rom, addr, charmap);
                let _ = write!(out, "#org {addr:#x}\n{body}");
            }
            RegionKind::Movs => {
                let body = decode_movs_region(rom, addr);
                let _ = write!(out, "#org {addr:#x}\n{body}\n");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movs_dump_includes_its_terminator() {
        let rom = Rom::new(vec![0x11, 0x12, 0xFE, 0x33]);
        let out = decode_movs_region(&rom, 0);
        assert_eq!(out, "#raw 0x11\n#raw 0x12\n#raw 0xfe\n");
    }

    #[test]
    fn region_opening_on_a_terminal_byte_is_empty() {
        let rom = Rom::new(vec![0xFF, 0x02]);
        let table = CommandTable::builtin();
        let (body, _) = decode_script_region(&rom, 0, &table, &DecompileOptions::default());
        assert!(body.is_empty());
    }

    #[test]
    fn unknown_bytes_degrade_to_raw() {
        // 0xEE is not a command; 0x02 is `end`.
        let rom = Rom::new(vec![0xEE, 0x02]);
        let table = CommandTable::builtin();
        let (body, _) = decode_script_region(&rom, 0, &table, &DecompileOptions::default());
        assert_eq!(body, "#raw 0xee\nend\n");
    }

    #[test]
    fn verbose_output_appends_bytes_and_addresses() {
        let rom = Rom::new(vec![0x29, 0x28, 0x08, 0x02]);
        let table = CommandTable::builtin();
        let opts = DecompileOptions {
            verbosity: 2,
            ..Default::default()
        };
        let (body, _) = decode_script_region(&rom, 0, &table, &opts);
        assert_eq!(body, "setflag 0x828 // 29 28 08 -  0x0\nend // 02 -  0x3\n");
    }
}
