use evscript_rs::charmap::Charmap;
use evscript_rs::commands::CommandTable;
use evscript_rs::encode::encode_script;
use evscript_rs::error::Error;
use evscript_rs::link::assemble;
use evscript_rs::parse::parse;
use evscript_rs::rom::{Rom, FREE_BYTE};
use pretty_assertions::assert_eq;

fn fixtures() -> (CommandTable, Charmap) {
    (CommandTable::builtin(), Charmap::builtin())
}

/// A ROM image of `size` zero bytes with one free run.
fn rom_with_free_run(size: usize, at: usize, len: usize) -> Rom {
    let mut bytes = vec![0u8; size];
    bytes[at..at + len].fill(FREE_BYTE);
    Rom::new(bytes)
}

#[test]
fn placeholder_free_scripts_resolve_idempotently() {
    let (table, charmap) = fixtures();
    let text = "#org 0x10\nsetflag 0x10\nend\n";
    let rom = Rom::new(vec![0u8; 0x40]);

    let (resolved, log) = assemble(text, &rom, &table, &charmap).unwrap();
    let single_pass = encode_script(&parse(text, &table).unwrap(), &table, &charmap).unwrap();

    assert!(log.is_empty());
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].addr, 0x10);
    assert_eq!(resolved[0].bytes, single_pass[0].bytes);
    assert_eq!(resolved[0].bytes, vec![0x29, 0x10, 0x00, 0x02]);
}

#[test]
fn labels_resolve_to_base_plus_offset() {
    let (table, charmap) = fixtures();
    let text = "#org 0x100\n\
                checkflag 0x10\n\
                if == jump :skip\n\
                setflag 0x10\n\
                :skip\n\
                end\n";
    let rom = Rom::new(vec![0u8; 0x40]);
    let (resolved, _) = assemble(text, &rom, &table, &charmap).unwrap();
    // :skip sits 12 bytes in, so the branch target is 0x10c with the
    // pointer-space flag.
    assert_eq!(
        resolved[0].bytes,
        vec![
            0x2B, 0x10, 0x00, // checkflag 0x10
            0x06, 0x01, 0x0C, 0x01, 0x00, 0x08, // jumpif == -> 0x800010c
            0x29, 0x10, 0x00, // setflag 0x10
            0x02, // end
        ]
    );
}

#[test]
fn anchored_match_is_used_without_margin() {
    let (table, charmap) = fixtures();
    let rom = rom_with_free_run(0x100, 0x50, 8);
    let (resolved, log) = assemble("#dyn 0x50\n#org @main\nend\n", &rom, &table, &charmap).unwrap();
    assert_eq!(resolved[0].addr, 0x50);
    assert_eq!(log, "@main -> 0x50\n");
}

#[test]
fn unanchored_match_gets_the_margin() {
    let (table, charmap) = fixtures();
    let rom = rom_with_free_run(0x100, 0x50, 8);
    let (resolved, _) = assemble("#dyn 0x4c\n#org @main\nend\n", &rom, &table, &charmap).unwrap();
    assert_eq!(resolved[0].addr, 0x52);
}

#[test]
fn the_cursor_never_reuses_claimed_space() {
    let (table, charmap) = fixtures();
    let rom = rom_with_free_run(0x100, 0x20, 0xE0);
    let text = "#dyn 0x20\n#org @a\nend\n#org @b\nend\n";
    let (resolved, log) = assemble(text, &rom, &table, &charmap).unwrap();
    // @a lands on the floor unmargined; the cursor then skips its span
    // plus the gap, and @b's match is no longer anchored.
    assert_eq!(resolved[0].addr, 0x20);
    assert_eq!(resolved[1].addr, 0x2F);
    assert_eq!(log, "@a -> 0x20\n@b -> 0x2f\n");
}

#[test]
fn exhausted_free_space_is_fatal() {
    let (table, charmap) = fixtures();
    let rom = Rom::new(vec![0u8; 0x40]);
    let err = assemble("#dyn 0x0\n#org @a\nend\n", &rom, &table, &charmap).unwrap_err();
    assert!(matches!(err, Error::NoFreeSpace { needed: 3, floor: 0 }));
}

#[test]
fn undefined_label_reference_is_fatal() {
    let (table, charmap) = fixtures();
    let rom = Rom::new(vec![0u8; 0x40]);
    let err = assemble("#org 0x10\njump :nowhere\nend\n", &rom, &table, &charmap).unwrap_err();
    assert!(matches!(err, Error::UndefinedSymbol { name } if name == ":nowhere"));
}

#[test]
fn duplicate_label_definition_is_fatal() {
    let (table, charmap) = fixtures();
    let rom = Rom::new(vec![0u8; 0x40]);
    let err = assemble(
        "#org 0x10\n:a\nnop\n:a\nend\n",
        &rom,
        &table,
        &charmap,
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateLabel { name } if name == ":a"));
}

#[test]
fn dynamic_chunks_and_labels_compose() {
    let (table, charmap) = fixtures();
    let rom = rom_with_free_run(0x100, 0x40, 0xC0);
    let text = "#dyn 0x40\n\
                #org @main\n\
                :top\n\
                pause 0x10\n\
                jump :top\n";
    let (resolved, _) = assemble(text, &rom, &table, &charmap).unwrap();
    assert_eq!(resolved[0].addr, 0x40);
    // :top is offset 0, so the jump targets @main itself.
    assert_eq!(
        resolved[0].bytes,
        vec![0x28, 0x10, 0x00, 0x05, 0x40, 0x00, 0x00, 0x08]
    );
}
