pub mod charmap;
pub mod commands;
pub mod decomp;
pub mod encode;
pub mod error;
pub mod link;
pub mod lower;
pub mod parse;
pub mod preproc;
pub mod rom;
pub mod script;

pub use charmap::Charmap;
pub use commands::{CommandDesc, CommandTable, RegionKind};
pub use decomp::{decompile, DecompileOptions};
pub use error::Error;
pub use link::{assemble, ResolvedChunk};
pub use lower::lower;
pub use preproc::preprocess;
pub use rom::Rom;
