//! This module provides parsing utilities for the MIPS-like assembly dialect.
use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::arch::{Architecture, InstKind};

/// A parsed instruction together with the metadata the scoreboard needs.
///
/// Register fields are optional so the three instruction formats share one
/// shape: R-type fills `dest`/`src_j`/`src_k`, I-type fills `dest`, `imm`
/// and `src_j`, J-type fills only `target`.
#[derive(Debug, Clone)]
pub struct Inst {
    /// Opcode, lower-cased.
    pub label: String,
    /// Functional unit serving this opcode.
    pub unit: String,
    pub kind: InstKind,
    pub dest: Option<String>,
    pub src_j: Option<String>,
    pub src_k: Option<String>,
    pub imm: Option<i64>,
    pub target: Option<String>,
    /// Extra execution clocks on top of the unit latency.
    pub extra_cost: u64,
}

/// Ordered instruction list. The PC of instruction `i` is `i * word_size`.
#[derive(Debug, Clone)]
pub struct Program {
    pub insts: Vec<Inst>,
    pub word_size: u64,
}

impl Program {
    pub fn pc(&self, index: usize) -> u64 {
        index as u64 * self.word_size
    }

    /// One word past the PC of the last instruction.
    pub fn size(&self) -> u64 {
        self.insts.len() as u64 * self.word_size
    }
}

#[derive(Default)]
pub struct ParseOption {
    check_registers: bool,
}

impl ParseOption {
    /// Reject registers that the architecture does not declare.
    pub fn set_check_registers(mut self, check: bool) -> Self {
        self.check_registers = check;
        self
    }
}

/// One compiled grammar per instruction format, applied to the operand part
/// of a line after the opcode has been split off.
struct Grammar {
    r: Regex,
    i: Regex,
    j: Regex,
}

impl Grammar {
    fn new() -> Self {
        // register and label tokens exclude separators so free whitespace
        // around commas and parentheses cannot shift group boundaries
        Self {
            r: Regex::new(r"^\s*([^\s,()]+)\s*,\s*([^\s,()]+)\s*,\s*([^\s,()]+)\s*$").unwrap(),
            i: Regex::new(r"^\s*([^\s,()]+)\s*,\s*([-+0-9]+)\s*\(\s*([^\s,()]+)\s*\)\s*$").unwrap(),
            j: Regex::new(r"^\s*([^\s,()]+)\s*$").unwrap(),
        }
    }
}

/// Transform assembly source into the ordered instruction list.
///
/// Lines are handled one at a time: everything from `#` to the end of the
/// line is dropped, blank remainders are skipped, and the first whitespace
/// token selects the opcode (case-insensitively) from the architecture's
/// instruction table. The declared instruction format then picks the
/// grammar for the rest of the line.
pub fn parse_program(src: &str, arch: &Architecture, option: ParseOption) -> Result<Program> {
    let grammar = Grammar::new();
    let mut insts: Vec<Inst> = Vec::new();

    for (idx, raw) in src.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let lineno = idx + 1;
        let pc = insts.len() as u64 * arch.word_size;

        let (opcode, rest) = match line.split_once(char::is_whitespace) {
            Some((opcode, rest)) => (opcode.to_lowercase(), rest),
            None => (line.to_lowercase(), ""),
        };
        let spec = arch
            .instruction_set
            .get(&opcode)
            .with_context(|| format!("unknown opcode `{opcode}` at line {lineno} (pc {pc})"))?;
        if !arch.functional_units.contains_key(&spec.functional_unit) {
            bail!(
                "opcode `{opcode}` maps to undeclared functional unit `{}` at line {lineno} (pc {pc})",
                spec.functional_unit
            );
        }

        let mut inst = Inst {
            label: opcode.clone(),
            unit: spec.functional_unit.clone(),
            kind: spec.kind,
            dest: None,
            src_j: None,
            src_k: None,
            imm: None,
            target: None,
            extra_cost: arch.extra_delay.get(&opcode).copied().unwrap_or(0),
        };
        match spec.kind {
            InstKind::R => {
                let caps = grammar.r.captures(rest).with_context(|| {
                    format!("malformed R-type `{opcode}` at line {lineno} (pc {pc})")
                })?;
                inst.dest = Some(caps[1].to_string());
                inst.src_j = Some(caps[2].to_string());
                inst.src_k = Some(caps[3].to_string());
            }
            InstKind::I => {
                let caps = grammar.i.captures(rest).with_context(|| {
                    format!("malformed I-type `{opcode}` at line {lineno} (pc {pc})")
                })?;
                inst.dest = Some(caps[1].to_string());
                inst.imm = Some(caps[2].parse().with_context(|| {
                    format!("bad immediate `{}` at line {lineno} (pc {pc})", &caps[2])
                })?);
                inst.src_j = Some(caps[3].to_string());
            }
            InstKind::J => {
                let caps = grammar.j.captures(rest).with_context(|| {
                    format!("malformed J-type `{opcode}` at line {lineno} (pc {pc})")
                })?;
                inst.target = Some(caps[1].to_string());
            }
        }

        if option.check_registers {
            for reg in [&inst.dest, &inst.src_j, &inst.src_k].into_iter().flatten() {
                if !arch.registers.contains(reg) {
                    bail!("unknown register `{reg}` at line {lineno} (pc {pc})");
                }
            }
        }

        insts.push(inst);
    }

    Ok(Program {
        insts,
        word_size: arch.word_size,
    })
}

#[cfg(test)]
pub mod tests {
    use super::{parse_program, ParseOption};
    use crate::arch::InstKind;
    use crate::isa::default_architecture;

    /// The classic scoreboarding walkthrough program.
    pub const DEMO_ASM: &str = r#"
# pipeline walkthrough
l.d   F6, 34(R2)
l.d   F2, 45(R3)
mul.d F0, F2, F4
sub.d F8, F6, F2
div.d F10, F0, F6   # long latency
add.d F6, F8, F2
"#;

    #[test]
    fn parses_the_demo_program() {
        let arch = default_architecture();
        let prog = parse_program(DEMO_ASM, &arch, ParseOption::default()).unwrap();
        assert_eq!(prog.insts.len(), 6);
        assert_eq!(prog.size(), 24);
        assert_eq!(prog.pc(2), 8);

        let ld = &prog.insts[0];
        assert_eq!(ld.label, "l.d");
        assert_eq!(ld.kind, InstKind::I);
        assert_eq!(ld.dest.as_deref(), Some("F6"));
        assert_eq!(ld.imm, Some(34));
        assert_eq!(ld.src_j.as_deref(), Some("R2"));
        assert_eq!(ld.src_k, None);
        assert_eq!(ld.unit, "integer_alu");

        let mul = &prog.insts[2];
        assert_eq!(mul.kind, InstKind::R);
        assert_eq!(mul.dest.as_deref(), Some("F0"));
        assert_eq!(mul.src_j.as_deref(), Some("F2"));
        assert_eq!(mul.src_k.as_deref(), Some("F4"));
        assert_eq!(mul.unit, "float_mult");
    }

    #[test]
    fn opcode_match_is_case_insensitive() {
        let arch = default_architecture();
        let prog = parse_program("MUL.D F0, F2, F4", &arch, ParseOption::default()).unwrap();
        assert_eq!(prog.insts[0].label, "mul.d");
    }

    #[test]
    fn whitespace_is_free_between_tokens() {
        let arch = default_architecture();
        let prog = parse_program("l.d F1 , -8 ( R4 )", &arch, ParseOption::default()).unwrap();
        assert_eq!(prog.insts[0].imm, Some(-8));
        assert_eq!(prog.insts[0].src_j.as_deref(), Some("R4"));

        let prog = parse_program("l.d F1,+12(R4)", &arch, ParseOption::default()).unwrap();
        assert_eq!(prog.insts[0].imm, Some(12));
    }

    #[test]
    fn parses_jump_instructions() {
        let arch = default_architecture();
        let prog = parse_program("j loop_head", &arch, ParseOption::default()).unwrap();
        let jmp = &prog.insts[0];
        assert_eq!(jmp.kind, InstKind::J);
        assert_eq!(jmp.target.as_deref(), Some("loop_head"));
        assert_eq!(jmp.dest, None);
        assert_eq!(jmp.src_j, None);
    }

    #[test]
    fn unknown_opcode_reports_line_and_pc() {
        let arch = default_architecture();
        let err = parse_program(
            "add F1, F2, F3\nfoo F1, F2, F3",
            &arch,
            ParseOption::default(),
        )
        .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("foo"));
        assert!(msg.contains("line 2"));
        assert!(msg.contains("pc 4"));
    }

    #[test]
    fn grammar_mismatch_is_an_error() {
        let arch = default_architecture();
        // R-type operands without commas
        assert!(parse_program("add F1 F2 F3", &arch, ParseOption::default()).is_err());
        // I-type operands with the R-type shape
        assert!(parse_program("l.d F1, F2, F3", &arch, ParseOption::default()).is_err());
        // trailing garbage
        assert!(parse_program("add F1, F2, F3, F4", &arch, ParseOption::default()).is_err());
    }

    #[test]
    fn register_check_is_opt_in() {
        let arch = default_architecture();
        let src = "add X9, F2, F3";
        assert!(parse_program(src, &arch, ParseOption::default()).is_ok());
        let err = parse_program(src, &arch, ParseOption::default().set_check_registers(true))
            .unwrap_err();
        assert!(format!("{err:#}").contains("X9"));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let arch = default_architecture();
        let src = "\n# full comment line\n   \nadd F1, F2, F3 # trailing\n";
        let prog = parse_program(src, &arch, ParseOption::default()).unwrap();
        assert_eq!(prog.insts.len(), 1);
        assert_eq!(prog.pc(0), 0);
    }
}
