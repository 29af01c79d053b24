//! Turns structured chunks into byte sequences plus a label-offset table
//! per chunk. Placeholder operands encode as dummy pointer bytes so pass 1
//! can size chunks before any address is known.

use tracing::debug;

use crate::charmap::Charmap;
use crate::commands::CommandTable;
use crate::error::Error;
use crate::script::{Arg, Origin, Record, Script};

/// ROM pointer-space flag. Set on pointer-carrying fields; subtracted to
/// get a file offset.
pub const POINTER_SPACE: u32 = 0x0800_0000;

/// Size reservation for an unresolved `@`/`:` operand: a pointer-width
/// value carrying only the pointer-space flag.
const DUMMY_POINTER: [u8; 4] = POINTER_SPACE.to_le_bytes();

#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub origin: Origin,
    pub bytes: Vec<u8>,
    /// (label name, byte offset at the point the label was met).
    pub labels: Vec<(String, usize)>,
}

fn encode_command(
    name: &str,
    args: &[Arg],
    dynamic: bool,
    table: &CommandTable,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    let desc = table.get(name).ok_or_else(|| Error::UnknownCommand {
        line: 0,
        context: name.to_string(),
    })?;
    out.push(desc.byte);
    out.extend_from_slice(&desc.prefix);
    for (i, arg) in args.iter().enumerate() {
        let width = desc.args[i];
        match arg {
            Arg::Literal(v) => {
                let mut v = *v;
                if desc.pointer_kind(i).is_some() {
                    v |= POINTER_SPACE;
                }
                // Authoritative range check, independent of the parser's
                // written-length heuristic.
                if width < 4 && u64::from(v) >= 1u64 << (8 * width) {
                    return Err(Error::ValueTooWide {
                        mnemonic: name.to_string(),
                        value: v,
                        width,
                    });
                }
                let le = v.to_le_bytes();
                let take = (width as usize).min(le.len());
                out.extend_from_slice(&le[..take]);
                // Wider-than-pointer fields pad with zero bytes.
                out.resize(out.len() + width as usize - take, 0);
            }
            Arg::Dyn(dyn_name) => {
                if !dynamic {
                    return Err(Error::NoDynamicDirective {
                        name: dyn_name.clone(),
                    });
                }
                out.extend_from_slice(&DUMMY_POINTER);
            }
            Arg::Label(_) => out.extend_from_slice(&DUMMY_POINTER),
        }
    }
    Ok(())
}

/// Encode every chunk of a script. Works for both passes: pass 1 runs with
/// placeholders still in place, pass 2 after substitution.
pub fn encode_script(
    script: &Script,
    table: &CommandTable,
    charmap: &Charmap,
) -> Result<Vec<EncodedChunk>, Error> {
    let dynamic = script.dynamic.is_some();
    let mut chunks = Vec::with_capacity(script.chunks.len());
    for chunk in &script.chunks {
        let mut bytes = Vec::new();
        let mut labels = Vec::new();
        for record in &chunk.records {
            match record {
                Record::Label(name) => labels.push((name.clone(), bytes.len())),
                Record::Raw(b) => bytes.push(*b),
                Record::Text(text) => bytes.extend(charmap.encode(text)?),
                Record::Command { name, args } => {
                    encode_command(name, args, dynamic, table, &mut bytes)?
                }
            }
        }
        debug!(origin = ?chunk.origin, len = bytes.len(), "encoded chunk");
        chunks.push(EncodedChunk {
            origin: chunk.origin.clone(),
            bytes,
            labels,
        });
    }
    Ok(chunks)
}
