use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};

use evscript_rs::{
    assemble, decompile, lower, preprocess, Charmap, CommandTable, DecompileOptions, RegionKind,
    ResolvedChunk, Rom,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Event-script compiler/decompiler for GBA ROM images", long_about = None)]
struct Cli {
    /// Be quiet
    #[arg(long, global = true)]
    quiet: bool,
    /// Be verbose; repeat for more
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// JSON command table replacing the built-in one
    #[arg(long, global = true, value_name = "FILE")]
    commands: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script and patch the ROM
    Compile {
        /// Path to the ROM image
        rom: PathBuf,
        /// Path to the script source
        script: PathBuf,
    },
    /// Compile but print the resolved chunks instead of writing
    Build {
        rom: PathBuf,
        script: PathBuf,
        /// Stop after control-flow lowering and print the flat text
        #[arg(long)]
        compile_only: bool,
        /// Stop after parsing and print the chunk structure
        #[arg(long)]
        parse_only: bool,
    },
    /// Decompile from a seed address
    Decompile {
        rom: PathBuf,
        /// Seed address (hex or dec)
        offset: String,
        /// Decompile the seed as text
        #[arg(long)]
        text: bool,
        /// Decompile the seed as raw movement data
        #[arg(long)]
        movs: bool,
        /// Consecutive zero bytes before stopping (0 to never stop)
        #[arg(long, default_value_t = 10)]
        max_nops: u32,
        /// Keep decoding past `end`
        #[arg(long)]
        continue_on_end: bool,
        /// Keep decoding past `jump`
        #[arg(long)]
        continue_on_jump: bool,
        /// Keep decoding past `return`
        #[arg(long)]
        continue_on_return: bool,
        /// Keep decoding past a 0xFF byte
        #[arg(long = "continue-on-0xff")]
        continue_on_ff: bool,
    },
}

fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse::<u32>()?)
    }
}

fn load_table(path: Option<&Path>) -> Result<CommandTable> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading command table {}", p.display()))?;
            CommandTable::from_json(&text)
        }
        None => Ok(CommandTable::builtin()),
    }
}

/// `#define` for the game variant, read from the ROM header.
fn base_directive(rom: &Rom) -> Option<&'static str> {
    match &rom.game_code()? {
        b"AXVE" => Some("#define RS 1\n"),
        b"BPRE" => Some("#define FR 1\n"),
        b"BPEE" => Some("#define EM 1\n"),
        _ => None,
    }
}

/// Preprocess and lower a script file into flat instruction text.
fn flatten(script_path: &Path, rom_path: &Path, rom: &Rom) -> Result<String> {
    let raw = std::fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;
    let raw = match base_directive(rom) {
        Some(directive) => format!("{directive}{raw}"),
        None => raw,
    };
    let dirs: Vec<PathBuf> = [
        Some(PathBuf::from(".")),
        rom_path.parent().map(Path::to_path_buf),
        script_path.parent().map(Path::to_path_buf),
    ]
    .into_iter()
    .flatten()
    .collect();
    let flat = preprocess(&raw, &dirs)?;
    Ok(lower(&flat)?)
}

fn hex_dump(chunks: &[ResolvedChunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&format!("{:#x}\n", chunk.addr));
        for row in chunk.bytes.chunks(16) {
            for b in row {
                out.push_str(&format!("{b:02x} "));
            }
            out.push('\n');
        }
    }
    out
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "info",
        (_, 1) => "debug",
        (_, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let table = load_table(cli.commands.as_deref())?;
    let charmap = Charmap::builtin();

    match cli.cmd {
        Command::Compile { rom, script } => {
            let mut image = Rom::load(&rom)?;
            let flat = flatten(&script, &rom, &image)?;
            let (chunks, log) = assemble(&flat, &image, &table, &charmap)?;
            for chunk in &chunks {
                image.patch(chunk.addr, &chunk.bytes)?;
            }
            image.save(&rom)?;
            info!("wrote {} chunk(s) to {}", chunks.len(), rom.display());
            println!("Log:");
            print!("{log}");
        }
        Command::Build {
            rom,
            script,
            compile_only,
            parse_only,
        } => {
            let image = Rom::load(&rom)?;
            let flat = flatten(&script, &rom, &image)?;
            if compile_only {
                println!("{flat}");
                return Ok(());
            }
            if parse_only {
                let parsed = evscript_rs::parse::parse(&flat, &table)?;
                println!("{parsed:#?}");
                return Ok(());
            }
            let (chunks, log) = assemble(&flat, &image, &table, &charmap)?;
            print!("{}", hex_dump(&chunks));
            println!("Log:");
            print!("{log}");
        }
        Command::Decompile {
            rom,
            offset,
            text,
            movs,
            max_nops,
            continue_on_end,
            continue_on_jump,
            continue_on_return,
            continue_on_ff,
        } => {
            let image = Rom::load(&rom)?;
            let seed = parse_u32(&offset)?;
            let kind = if text {
                RegionKind::Text
            } else if movs {
                RegionKind::Movs
            } else {
                RegionKind::Script
            };
            let mut opts = DecompileOptions {
                max_nops,
                verbosity: cli.verbose,
                ..Default::default()
            };
            let skip = [
                (continue_on_end, "end"),
                (continue_on_jump, "jump"),
                (continue_on_return, "return"),
            ];
            for (flag, name) in skip {
                if flag {
                    opts.end_mnemonics.retain(|m| m != name);
                }
            }
            if continue_on_ff {
                opts.end_bytes.clear();
            }
            print!("{}", decompile(&image, seed, kind, &table, &charmap, &opts));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u32_hex_and_dec() {
        assert_eq!(parse_u32("0x10").unwrap(), 0x10);
        assert_eq!(parse_u32("16").unwrap(), 16);
        assert!(parse_u32("zz").is_err());
    }

    #[test]
    fn hex_dump_wraps_rows() {
        let chunks = vec![ResolvedChunk {
            addr: 0x800000,
            bytes: (0..18).collect(),
        }];
        let dump = hex_dump(&chunks);
        assert!(dump.starts_with("0x800000\n00 01 "));
        assert_eq!(dump.lines().count(), 3);
    }
}
