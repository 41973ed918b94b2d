//! Programs: immutable instruction sequences fed to processes.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::instruction::{parse_line, Instruction};

pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Load a `.pc` script: one instruction per line, `#` comments and
    /// blank lines skipped. Malformed lines fail the whole load.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Rc<Program>, String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;

        let program = Self::parse(&content)?;
        info!(
            "Loaded {} instructions from {}",
            program.len(),
            path.display()
        );
        Ok(Rc::new(program))
    }

    pub fn parse(content: &str) -> Result<Program, String> {
        let mut instructions = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            match parse_line(line) {
                Ok(Some(inst)) => instructions.push(inst),
                Ok(None) => {}
                Err(e) => return Err(format!("line {}: {}", lineno + 1, e)),
            }
        }
        if instructions.is_empty() {
            return Err("program has no instructions".to_string());
        }
        Ok(Program { instructions })
    }

    /// The default program: `n` compute instructions.
    pub fn compute_only(n: usize) -> Rc<Program> {
        Rc::new(Program {
            instructions: vec![Instruction::Compute; n],
        })
    }

    pub fn from_instructions(instructions: Vec<Instruction>) -> Rc<Program> {
        Rc::new(Program { instructions })
    }

    pub fn get(&self, pc: usize) -> &Instruction {
        &self.instructions[pc]
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_mixed_script() {
        let script = "\
# warm up
C
R 0x0
W 0x1000

FO 3 /tmp/f
FW 3 16
FC 3
S 2
";
        let program = Program::parse(script).unwrap();
        assert_eq!(program.len(), 7);
        assert_eq!(*program.get(0), Instruction::Compute);
        assert_eq!(
            *program.get(4),
            Instruction::FileWrite { fd: 3, size: 16 }
        );
    }

    #[test]
    fn empty_script_is_an_error() {
        assert!(Program::parse("# nothing here\n\n").is_err());
    }

    #[test]
    fn error_carries_line_number() {
        let err = Program::parse("C\nBOGUS\n").unwrap_err();
        assert!(err.contains("line 2"), "{}", err);
    }

    #[test]
    fn compute_only_length() {
        let program = Program::compute_only(5);
        assert_eq!(program.len(), 5);
        assert!(matches!(*program.get(4), Instruction::Compute));
    }
}
