//! The instruction set of scripted programs and its line parser.

use core::fmt;

/// One scripted instruction. Each variant has exactly one side effect when
/// dispatched by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Compute,
    MemRead { addr: u64 },
    MemWrite { addr: u64 },
    /// `fd: None` asks the process to allocate the next free script fd.
    FileOpen { fd: Option<i32>, path: String },
    FileClose { fd: i32 },
    FileRead { fd: i32, size: usize },
    FileWrite { fd: i32, size: usize },
    DevRequest { dev: u32 },
    DevRelease { dev: u32 },
    Sleep { ticks: u32 },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Compute => write!(f, "Compute"),
            Instruction::MemRead { addr } => write!(f, "MemRead addr={:#x}", addr),
            Instruction::MemWrite { addr } => write!(f, "MemWrite addr={:#x}", addr),
            Instruction::FileOpen { fd: Some(fd), path } => {
                write!(f, "FileOpen fd={} file={}", fd, path)
            }
            Instruction::FileOpen { fd: None, path } => write!(f, "FileOpen file={}", path),
            Instruction::FileClose { fd } => write!(f, "FileClose fd={}", fd),
            Instruction::FileRead { fd, size } => write!(f, "FileRead fd={} size={}", fd, size),
            Instruction::FileWrite { fd, size } => write!(f, "FileWrite fd={} size={}", fd, size),
            Instruction::DevRequest { dev } => write!(f, "DevRequest dev={}", dev),
            Instruction::DevRelease { dev } => write!(f, "DevRelease dev={}", dev),
            Instruction::Sleep { ticks } => write!(f, "Sleep {}", ticks),
        }
    }
}

/// Parse an integer with C-style base prefixes: `0x` hex, leading `0`
/// octal, decimal otherwise.
fn parse_number(token: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if token.len() > 1 && token.starts_with('0') {
        u64::from_str_radix(&token[1..], 8)
    } else {
        token.parse()
    };
    parsed.map_err(|_| format!("bad number '{}'", token))
}

fn operand(tokens: &[&str], idx: usize, what: &str) -> Result<u64, String> {
    let token = tokens.get(idx).ok_or_else(|| format!("missing {}", what))?;
    parse_number(token)
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Instruction>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let inst = match tokens[0] {
        "C" | "COMPUTE" => Instruction::Compute,
        "R" | "MEMREAD" => Instruction::MemRead {
            addr: operand(&tokens, 1, "address")?,
        },
        "W" | "MEMWRITE" => Instruction::MemWrite {
            addr: operand(&tokens, 1, "address")?,
        },
        "FO" | "FILEOPEN" => match tokens.len() {
            2 => Instruction::FileOpen {
                fd: None,
                path: tokens[1].to_string(),
            },
            3 => Instruction::FileOpen {
                fd: Some(operand(&tokens, 1, "fd")? as i32),
                path: tokens[2].to_string(),
            },
            _ => return Err("FILEOPEN takes [<fd>] <path>".to_string()),
        },
        "FC" | "FILECLOSE" => Instruction::FileClose {
            fd: operand(&tokens, 1, "fd")? as i32,
        },
        "FR" | "FILEREAD" => Instruction::FileRead {
            fd: operand(&tokens, 1, "fd")? as i32,
            size: operand(&tokens, 2, "size")? as usize,
        },
        "FW" | "FILEWRITE" => Instruction::FileWrite {
            fd: operand(&tokens, 1, "fd")? as i32,
            size: operand(&tokens, 2, "size")? as usize,
        },
        "DR" | "DEVREQ" => Instruction::DevRequest {
            dev: operand(&tokens, 1, "device")? as u32,
        },
        "DD" | "DEVREL" => Instruction::DevRelease {
            dev: operand(&tokens, 1, "device")? as u32,
        },
        "S" | "SLEEP" => Instruction::Sleep {
            ticks: operand(&tokens, 1, "duration")? as u32,
        },
        other => return Err(format!("unknown opcode '{}'", other)),
    };
    Ok(Some(inst))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_opcodes() {
        assert_eq!(parse_line("C").unwrap(), Some(Instruction::Compute));
        assert_eq!(parse_line("COMPUTE").unwrap(), Some(Instruction::Compute));
        assert_eq!(
            parse_line("R 0x1000").unwrap(),
            Some(Instruction::MemRead { addr: 0x1000 })
        );
        assert_eq!(
            parse_line("MEMWRITE 4096").unwrap(),
            Some(Instruction::MemWrite { addr: 4096 })
        );
        assert_eq!(
            parse_line("S 3").unwrap(),
            Some(Instruction::Sleep { ticks: 3 })
        );
    }

    #[test]
    fn parses_both_fileopen_forms() {
        assert_eq!(
            parse_line("FO /a/b").unwrap(),
            Some(Instruction::FileOpen {
                fd: None,
                path: "/a/b".to_string()
            })
        );
        assert_eq!(
            parse_line("FILEOPEN 4 /a/b").unwrap(),
            Some(Instruction::FileOpen {
                fd: Some(4),
                path: "/a/b".to_string()
            })
        );
    }

    #[test]
    fn c_style_bases() {
        assert_eq!(parse_number("0x20").unwrap(), 0x20);
        assert_eq!(parse_number("010").unwrap(), 8);
        assert_eq!(parse_number("10").unwrap(), 10);
        assert_eq!(parse_number("0").unwrap(), 0);
        assert!(parse_number("zzz").is_err());
    }

    #[test]
    fn skips_blanks_and_comments() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn rejects_junk() {
        assert!(parse_line("XYZZY").is_err());
        assert!(parse_line("R").is_err());
        assert!(parse_line("FR 3").is_err());
    }
}
