use thiserror::Error;

/// Fatal, whole-operation-aborting conditions. Parser-stage variants carry
/// the line number and surrounding source context; encoder- and link-stage
/// variants carry the offending value or name instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no matching {close} found")]
    UnmatchedDelimiter { close: char },

    #[error("unmatched @ label {name}: no `#org @{name}` in script")]
    UndefinedDynamic { name: String },

    #[error("command not found in line {line}:\n{context}")]
    UnknownCommand { line: usize, context: String },

    #[error(
        "wrong argument number for `{name}` in line {line}: {given} given, {wanted} needed\n{context}"
    )]
    WrongArity {
        name: String,
        line: usize,
        given: usize,
        wanted: usize,
        context: String,
    },

    #[error("bad argument `{token}` in line {line}:\n{context}")]
    BadArgument {
        token: String,
        line: usize,
        context: String,
    },

    #[error("arg too long ({want} byte(s) declared, {have} given) in line {line}:\n{context}")]
    ArgTooLong {
        line: usize,
        have: usize,
        want: usize,
        context: String,
    },

    #[error("value {value:#x} does not fit in {width} byte(s) for `{mnemonic}`")]
    ValueTooWide {
        mnemonic: String,
        value: u32,
        width: u8,
    },

    #[error("@{name} used without a #dyn/#dynamic statement")]
    NoDynamicDirective { name: String },

    #[error("#dyn/#dynamic statement needs an address argument (line {line})")]
    BadDynDirective { line: usize },

    #[error("malformed directive in line {line}: {text}")]
    BadDirective { line: usize, text: String },

    #[error("no #org found before line {line}:\n{context}")]
    MissingOrg { line: usize, context: String },

    #[error("no free space for a {needed}-byte chunk at or after {floor:#x}")]
    NoFreeSpace { needed: usize, floor: u32 },

    #[error("undefined reference {name}")]
    UndefinedSymbol { name: String },

    #[error("label {name} defined more than once")]
    DuplicateLabel { name: String },

    #[error("cannot encode {ch:?}: not in the character table")]
    Unencodable { ch: char },

    #[error("the 0xFF terminator is not valid inside a text body")]
    TerminatorInText,

    #[error("include file {name:?} not found in search path")]
    IncludeNotFound { name: String },

    #[error("includes nested too deeply at {name:?}")]
    IncludeTooDeep { name: String },
}
