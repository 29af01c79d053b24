//! End-to-end: preprocess -> lower -> assemble -> patch -> decompile.

use evscript_rs::charmap::Charmap;
use evscript_rs::commands::{CommandTable, RegionKind};
use evscript_rs::decomp::{decompile, DecompileOptions};
use evscript_rs::link::assemble;
use evscript_rs::lower::lower;
use evscript_rs::preproc::preprocess;
use evscript_rs::rom::{Rom, FREE_BYTE};
use pretty_assertions::assert_eq;

const SRC: &str = "\
#dyn 0x40
#org @main
lock // stop the player first
if (0x828) {
    msgbox @hello 0x6
}
release
end

#org @hello
= HI
";

#[test]
fn a_structured_script_compiles_and_decompiles() {
    let table = CommandTable::builtin();
    let charmap = Charmap::builtin();
    let mut bytes = vec![0u8; 0x100];
    bytes[0x40..].fill(FREE_BYTE);
    let mut rom = Rom::new(bytes);

    let flat = preprocess(SRC, &[]).unwrap();
    let flat = lower(&flat).unwrap();
    let (chunks, log) = assemble(&flat, &rom, &table, &charmap).unwrap();

    assert_eq!(log, "@main -> 0x40\n@hello -> 0x62\n");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].addr, 0x40);
    assert_eq!(
        chunks[0].bytes,
        vec![
            0x6A, // lock
            0x2B, 0x28, 0x08, // checkflag 0x828
            0x06, 0x05, 0x52, 0x00, 0x00, 0x08, // jumpif != -> :if_end0
            0x0F, 0x00, 0x62, 0x00, 0x00, 0x08, // msgbox @hello
            0x09, 0x06, // callstd 0x6
            0x6C, // release
            0x02, // end
        ]
    );
    assert_eq!(chunks[1].addr, 0x62);
    assert_eq!(chunks[1].bytes, vec![0xC2, 0xC3]);

    for chunk in &chunks {
        rom.patch(chunk.addr, &chunk.bytes).unwrap();
    }
    // The text chunk carries no terminator of its own; the free byte that
    // follows it is the terminator the engine reads.
    assert_eq!(rom.bytes[0x64], FREE_BYTE);

    let out = decompile(
        &rom,
        0x40,
        RegionKind::Script,
        &table,
        &charmap,
        &DecompileOptions::default(),
    );
    assert!(out.starts_with("#org 0x40\nlock\ncheckflag 0x828\njumpif 0x5 0x8000052\n"));
    assert!(out.contains("#org 0x52\ncallstd 0x6\nrelease\nend\n"));
    assert!(out.contains("#org 0x62\n= HI\n"));
}

#[test]
fn goto_is_accepted_as_a_jump_alias() {
    let table = CommandTable::builtin();
    let charmap = Charmap::builtin();
    let rom = Rom::new(vec![0u8; 0x40]);
    let (a, _) = assemble("#org 0x10\ngoto 0x20\n", &rom, &table, &charmap).unwrap();
    let (b, _) = assemble("#org 0x10\njump 0x20\n", &rom, &table, &charmap).unwrap();
    assert_eq!(a[0].bytes, b[0].bytes);
}

#[test]
fn defines_flow_through_to_the_encoder() {
    let table = CommandTable::builtin();
    let charmap = Charmap::builtin();
    let rom = Rom::new(vec![0u8; 0x40]);
    let src = "#define BADGE 0x828\n#org 0x10\nsetflag BADGE\nend\n";
    let flat = preprocess(src, &[]).unwrap();
    let flat = lower(&flat).unwrap();
    let (chunks, _) = assemble(&flat, &rom, &table, &charmap).unwrap();
    assert_eq!(chunks[0].bytes, vec![0x29, 0x28, 0x08, 0x02]);
}
