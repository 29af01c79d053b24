//! Line-oriented instruction parser: flattened script text to structured
//! chunks, validated against the command table.

use tracing::debug;

use crate::commands::CommandTable;
use crate::error::Error;
use crate::lower::OPERATOR_CODES;
use crate::script::{Arg, Chunk, Origin, Record, Script};

/// Hex (`0x…`) or decimal. Decimal values are masked to 24 bits, matching
/// the encoder's view of plain numbers.
pub fn parse_num(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok().map(|v| (v & 0xFF_FFFF) as u32)
    }
}

/// Error context: three lines before through five lines after `num`.
fn context(lines: &[&str], num: usize) -> String {
    let start = num.saturating_sub(3);
    let end = (num + 6).min(lines.len());
    lines[start..end]
        .iter()
        .map(|l| format!("    {l}\n"))
        .collect()
}

/// Heuristic byte length of an argument as written: nibble count of a hex
/// literal, or half the decimal digit count. Truncating on purpose; the
/// encoder does the authoritative range check.
fn written_len(arg: &str) -> usize {
    match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => hex.len() / 2,
        None => arg.len() / 2,
    }
}

struct LineParser<'a> {
    table: &'a CommandTable,
    lines: Vec<&'a str>,
    script: Script,
    open: bool,
}

impl<'a> LineParser<'a> {
    fn parse_arg(&self, token: &str, num: usize) -> Result<Arg, Error> {
        if let Some(name) = token.strip_prefix('@') {
            return Ok(Arg::Dyn(name.to_string()));
        }
        if let Some(name) = token.strip_prefix(':') {
            return Ok(Arg::Label(name.to_string()));
        }
        parse_num(token)
            .map(Arg::Literal)
            .ok_or_else(|| Error::BadArgument {
                token: token.to_string(),
                line: num + 1,
                context: context(&self.lines, num),
            })
    }

    fn current_chunk(&mut self, num: usize) -> Result<&mut Chunk, Error> {
        if !self.open {
            return Err(Error::MissingOrg {
                line: num + 1,
                context: context(&self.lines, num),
            });
        }
        Ok(self.script.chunks.last_mut().expect("open chunk"))
    }

    /// Build a validated Command record: known mnemonic, exact arity, and
    /// the written-length width heuristic per argument.
    fn command_record(&self, name: &str, args: &[&str], num: usize) -> Result<Record, Error> {
        let canon = self.table.resolve_alias(name);
        let desc = self.table.get(canon).ok_or_else(|| Error::UnknownCommand {
            line: num + 1,
            context: context(&self.lines, num),
        })?;
        if args.len() != desc.args.len() {
            return Err(Error::WrongArity {
                name: canon.to_string(),
                line: num + 1,
                given: args.len(),
                wanted: desc.args.len(),
                context: context(&self.lines, num),
            });
        }
        let mut parsed = Vec::with_capacity(args.len());
        for (i, &tok) in args.iter().enumerate() {
            let arg = self.parse_arg(tok, num)?;
            if matches!(arg, Arg::Literal(_)) {
                let want = desc.args[i] as usize;
                let have = written_len(tok);
                if have > want {
                    return Err(Error::ArgTooLong {
                        line: num + 1,
                        have,
                        want,
                        context: context(&self.lines, num),
                    });
                }
            }
            parsed.push(arg);
        }
        Ok(Record::Command {
            name: canon.to_string(),
            args: parsed,
        })
    }

    fn parse_line(&mut self, num: usize, line: &'a str) -> Result<(), Error> {
        let line = line.trim_end_matches(' ');
        if line.is_empty() {
            return Ok(());
        }
        if let Some(name) = line.strip_prefix(':') {
            self.current_chunk(num)?
                .records
                .push(Record::Label(name.to_string()));
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix('=') {
            let text = rest.strip_prefix(' ').unwrap_or(rest);
            self.current_chunk(num)?
                .records
                .push(Record::Text(text.to_string()));
            return Ok(());
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(());
        };
        match command {
            "#org" => {
                let &[addr] = args else {
                    return Err(Error::BadDirective {
                        line: num + 1,
                        text: line.to_string(),
                    });
                };
                let origin = match addr.strip_prefix('@') {
                    Some(name) => Origin::Dynamic(name.to_string()),
                    None => Origin::Fixed(parse_num(addr).ok_or_else(|| Error::BadArgument {
                        token: addr.to_string(),
                        line: num + 1,
                        context: context(&self.lines, num),
                    })?),
                };
                self.script.chunks.push(Chunk {
                    origin,
                    records: Vec::new(),
                });
                self.open = true;
            }
            "#dyn" | "#dynamic" => {
                let &[addr] = args else {
                    return Err(Error::BadDynDirective { line: num + 1 });
                };
                let floor = parse_num(addr).ok_or(Error::BadDynDirective { line: num + 1 })?;
                self.script.dynamic = Some(floor);
            }
            "#raw" => {
                let &[byte] = args else {
                    return Err(Error::BadDirective {
                        line: num + 1,
                        text: line.to_string(),
                    });
                };
                let value = u8::from_str_radix(byte.trim_start_matches("0x"), 16).map_err(
                    |_| Error::BadArgument {
                        token: byte.to_string(),
                        line: num + 1,
                        context: context(&self.lines, num),
                    },
                )?;
                self.current_chunk(num)?.records.push(Record::Raw(value));
            }
            "if" => {
                // `if <op> <jump|call|jumpstd|callstd> <target>`
                let &[op, branch, target] = args else {
                    return Err(Error::WrongArity {
                        name: "if".to_string(),
                        line: num + 1,
                        given: args.len(),
                        wanted: 3,
                        context: context(&self.lines, num),
                    });
                };
                let mnemonic = match branch {
                    "jump" => "jumpif",
                    "call" => "callif",
                    "jumpstd" => "jumpstdif",
                    "callstd" => "callstdif",
                    _ => {
                        return Err(Error::BadDirective {
                            line: num + 1,
                            text: line.to_string(),
                        })
                    }
                };
                let code = match OPERATOR_CODES.iter().find(|(o, _)| *o == op) {
                    Some(&(_, code)) => Arg::Literal(code),
                    None => self.parse_arg(op, num)?,
                };
                let record = Record::Command {
                    name: mnemonic.to_string(),
                    args: vec![code, self.parse_arg(target, num)?],
                };
                self.current_chunk(num)?.records.push(record);
            }
            "msgbox" if args.len() == 2 => {
                // The documented two-argument sugar: split into the pointer
                // load and a callstd. Applied to this exact form only.
                let msg = self.command_record("msgbox", &args[..1], num)?;
                let callstd = self.command_record("callstd", &args[1..], num)?;
                let chunk = self.current_chunk(num)?;
                chunk.records.push(msg);
                chunk.records.push(callstd);
            }
            _ => {
                let record = self.command_record(command, args, num)?;
                self.current_chunk(num)?.records.push(record);
            }
        }
        Ok(())
    }
}

/// Parse flattened, lowered text into a structured script.
pub fn parse(text: &str, table: &CommandTable) -> Result<Script, Error> {
    let mut parser = LineParser {
        table,
        lines: text.lines().collect(),
        script: Script {
            chunks: Vec::new(),
            dynamic: None,
        },
        open: false,
    };
    for num in 0..parser.lines.len() {
        let line = parser.lines[num];
        parser.parse_line(num, line)?;
    }
    debug!(chunks = parser.script.chunks.len(), "parsed script");
    Ok(parser.script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;
    use crate::script::{Arg, Origin, Record};

    fn parse_ok(text: &str) -> Script {
        parse(text, &CommandTable::builtin()).unwrap()
    }

    #[test]
    fn org_opens_chunks_and_labels_attach() {
        let s = parse_ok("#org 0x800100\nlock\n:here\nrelease\nend\n");
        assert_eq!(s.chunks.len(), 1);
        assert_eq!(s.chunks[0].origin, Origin::Fixed(0x800100));
        assert_eq!(s.chunks[0].records[1], Record::Label("here".into()));
    }

    #[test]
    fn if_sugar_maps_operator_codes() {
        let s = parse_ok("#org @x\nif <= jump :skip\n:skip\nend\n");
        let Record::Command { name, args } = &s.chunks[0].records[0] else {
            panic!("expected command");
        };
        assert_eq!(name, "jumpif");
        assert_eq!(args[0], Arg::Literal(3));
        assert_eq!(args[1], Arg::Label("skip".into()));
    }

    #[test]
    fn msgbox_sugar_splits_into_two_records() {
        let s = parse_ok("#org @x\nmsgbox @text 0x6\nend\n");
        let recs = &s.chunks[0].records;
        assert!(
            matches!(&recs[0], Record::Command { name, args } if name == "msgbox" && args[0] == Arg::Dyn("text".into()))
        );
        assert!(
            matches!(&recs[1], Record::Command { name, args } if name == "callstd" && args[0] == Arg::Literal(6))
        );
    }

    #[test]
    fn instruction_before_org_is_fatal() {
        let err = parse("lock\n", &CommandTable::builtin()).unwrap_err();
        assert!(matches!(err, Error::MissingOrg { line: 1, .. }));
    }

    #[test]
    fn unknown_command_reports_context() {
        let err = parse("#org 0x100\nfrobnicate 1\n", &CommandTable::builtin()).unwrap_err();
        let Error::UnknownCommand { line, context } = err else {
            panic!("wrong error");
        };
        assert_eq!(line, 2);
        assert!(context.contains("frobnicate"));
    }

    #[test]
    fn arity_is_checked_exactly() {
        let err = parse("#org 0x100\nsetflag 0x10 0x11\n", &CommandTable::builtin()).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongArity { given: 2, wanted: 1, .. }
        ));
    }

    #[test]
    fn width_heuristic_rejects_long_literals() {
        let err = parse("#org 0x100\nsetflag 0x123456\n", &CommandTable::builtin()).unwrap_err();
        assert!(matches!(err, Error::ArgTooLong { have: 3, want: 2, .. }));
    }

    #[test]
    fn dyn_needs_exactly_one_argument() {
        let err = parse("#dyn\n", &CommandTable::builtin()).unwrap_err();
        assert!(matches!(err, Error::BadDynDirective { line: 1 }));
    }
}
