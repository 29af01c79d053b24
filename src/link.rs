//! Two-pass address resolution. Chunk sizes are only known after encoding,
//! while encoding needs resolved addresses to be deterministic, so a
//! throwaway sizing pass runs first, then a symbol table is built from
//! free-space search and label offsets, substituted into the structured
//! script, and the result is re-encoded.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::{debug, info};

use crate::charmap::Charmap;
use crate::commands::CommandTable;
use crate::encode::{encode_script, EncodedChunk};
use crate::error::Error;
use crate::parse::parse;
use crate::rom::Rom;
use crate::script::{Arg, Origin, Record, Script};

/// Safety margin around dynamically-placed chunks.
const MARGIN: usize = 2;
/// Gap the search cursor skips past each placed chunk.
const CURSOR_GAP: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChunk {
    pub addr: u32,
    pub bytes: Vec<u8>,
}

/// Name -> address map built during resolution. Keys keep their sigil so
/// `@name` and `:name` never collide.
struct SymbolTable {
    map: HashMap<String, u32>,
}

impl SymbolTable {
    fn lookup(&self, key: &str) -> Result<u32, Error> {
        self.map
            .get(key)
            .copied()
            .ok_or_else(|| Error::UndefinedSymbol { name: key.into() })
    }
}

/// Free-space search for every dynamic chunk, then label offsets on top of
/// the resolved bases. Returns the table and the human-readable log.
fn resolve(
    script: &Script,
    sized: &[EncodedChunk],
    rom: &Rom,
) -> Result<(SymbolTable, String), Error> {
    let mut map = HashMap::new();
    let mut log = String::new();

    if sized.iter().any(|c| matches!(c.origin, Origin::Dynamic(_))) {
        let floor = match script.dynamic {
            Some(floor) => floor,
            None => {
                let name = sized
                    .iter()
                    .find_map(|c| match &c.origin {
                        Origin::Dynamic(n) => Some(n.clone()),
                        Origin::Fixed(_) => None,
                    })
                    .expect("dynamic chunk");
                return Err(Error::NoDynamicDirective { name });
            }
        };
        let mut cursor = floor;
        for chunk in sized {
            let Origin::Dynamic(name) = &chunk.origin else {
                continue;
            };
            let needed = chunk.bytes.len() + MARGIN;
            let run = rom
                .find_free(needed, cursor)
                .ok_or(Error::NoFreeSpace { needed, floor })?;
            // Margin only when the match is not anchored exactly at the
            // declared floor.
            let addr = if run == floor { run } else { run + MARGIN as u32 };
            cursor = addr + needed as u32 + CURSOR_GAP;
            info!("@{name} -> {addr:#x}");
            let _ = writeln!(log, "@{name} -> {addr:#x}");
            if map.insert(format!("@{name}"), addr).is_some() {
                return Err(Error::DuplicateLabel {
                    name: format!("@{name}"),
                });
            }
        }
    }

    let mut symbols = SymbolTable { map };
    for chunk in sized {
        let base = match &chunk.origin {
            Origin::Fixed(addr) => *addr,
            Origin::Dynamic(name) => symbols.lookup(&format!("@{name}"))?,
        };
        for (label, offset) in &chunk.labels {
            debug!("label :{label} at {base:#x}+{offset:#x}");
            if symbols
                .map
                .insert(format!(":{label}"), base + *offset as u32)
                .is_some()
            {
                return Err(Error::DuplicateLabel {
                    name: format!(":{label}"),
                });
            }
        }
    }
    Ok((symbols, log))
}

/// One substitution pass over the structured script: placeholder operands
/// become literals, dynamic origins become fixed, and label records are
/// dropped (fully consumed by resolution).
fn substitute(script: &Script, symbols: &SymbolTable) -> Result<Script, Error> {
    let mut chunks = Vec::with_capacity(script.chunks.len());
    for chunk in &script.chunks {
        let origin = match &chunk.origin {
            Origin::Fixed(addr) => Origin::Fixed(*addr),
            Origin::Dynamic(name) => Origin::Fixed(symbols.lookup(&format!("@{name}"))?),
        };
        let mut records = Vec::with_capacity(chunk.records.len());
        for record in &chunk.records {
            match record {
                Record::Label(_) => {}
                Record::Command { name, args } => {
                    let mut subbed = Vec::with_capacity(args.len());
                    for arg in args {
                        subbed.push(match arg {
                            Arg::Literal(v) => Arg::Literal(*v),
                            Arg::Dyn(n) => Arg::Literal(symbols.lookup(&format!("@{n}"))?),
                            Arg::Label(n) => Arg::Literal(symbols.lookup(&format!(":{n}"))?),
                        });
                    }
                    records.push(Record::Command {
                        name: name.clone(),
                        args: subbed,
                    });
                }
                other => records.push(other.clone()),
            }
        }
        chunks.push(crate::script::Chunk { origin, records });
    }
    Ok(Script {
        chunks,
        dynamic: script.dynamic,
    })
}

/// Compile flattened script text against a ROM image: parse, sizing pass,
/// resolve, substitute, final pass. Returns the resolved chunks and the
/// resolution log. Running on placeholder-free input is equivalent to a
/// single parse+encode.
pub fn assemble(
    text: &str,
    rom: &Rom,
    table: &CommandTable,
    charmap: &Charmap,
) -> Result<(Vec<ResolvedChunk>, String), Error> {
    let script = parse(text, table)?;

    debug!("sizing pass");
    let sized = encode_script(&script, table, charmap)?;
    let (symbols, log) = resolve(&script, &sized, rom)?;

    debug!("final pass");
    let resolved = substitute(&script, &symbols)?;
    let finished = encode_script(&resolved, table, charmap)?;

    let mut out = Vec::with_capacity(finished.len());
    for chunk in finished {
        let Origin::Fixed(addr) = chunk.origin else {
            unreachable!("substitution left a dynamic origin");
        };
        out.push(ResolvedChunk {
            addr,
            bytes: chunk.bytes,
        });
    }
    Ok((out, log))
}
