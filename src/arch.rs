//! Machine description for the simulated architecture.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{bail, Result};

/// MIPS instruction formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    R,
    I,
    J,
}

/// One functional unit declaration: `quantity` identical replicas, each
/// needing `clock_cycles` clocks to execute an operation.
#[derive(Debug, Clone)]
pub struct FuncUnit {
    pub quantity: usize,
    pub clock_cycles: u64,
}

/// Opcode table entry: which functional unit serves the opcode and which
/// grammar parses it.
#[derive(Debug, Clone)]
pub struct InstSpec {
    pub functional_unit: String,
    pub kind: InstKind,
}

/// Scoreboard pipeline stages, in firing order. `UpdateFlags` is only part
/// of the pipeline when the five-stage model is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Issue,
    ReadOperands,
    Execution,
    WriteResult,
    UpdateFlags,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Issue => "issue",
            Stage::ReadOperands => "read_operands",
            Stage::Execution => "execution",
            Stage::WriteResult => "write_result",
            Stage::UpdateFlags => "update_flags",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed clock cost of the instruction-independent pipeline stages. The
/// execution stage takes its cost from the functional unit instead.
#[derive(Debug, Clone)]
pub struct StageDelay {
    pub issue: u64,
    pub read_operands: u64,
    pub write_result: u64,
}

/// Immutable machine description: functional units, opcode table, stage
/// delays and the register set.
#[derive(Debug, Clone)]
pub struct Architecture {
    pub functional_units: BTreeMap<String, FuncUnit>,
    pub stage_delay: StageDelay,
    /// Extra execution clocks for specific opcodes, added on top of the
    /// functional unit latency.
    pub extra_delay: BTreeMap<String, u64>,
    pub word_size: u64,
    pub registers: BTreeSet<String>,
    /// Opcode table, keys lower-cased (lookup is case-insensitive).
    pub instruction_set: BTreeMap<String, InstSpec>,
}

impl Architecture {
    /// Check the positivity and cross-reference invariants of the
    /// description. Must pass before the description is handed to the
    /// scoreboard.
    pub fn validate(&self) -> Result<()> {
        if self.word_size == 0 {
            bail!("word size must be at least 1");
        }
        if self.registers.is_empty() {
            bail!("architecture declares no registers");
        }
        if self.functional_units.is_empty() {
            bail!("architecture declares no functional units");
        }
        for (name, unit) in &self.functional_units {
            if unit.quantity == 0 {
                bail!("functional unit `{}` has zero replicas", name);
            }
            if unit.clock_cycles == 0 {
                bail!("functional unit `{}` has zero clock cycles", name);
            }
        }
        if self.stage_delay.issue == 0
            || self.stage_delay.read_operands == 0
            || self.stage_delay.write_result == 0
        {
            bail!("pipeline stage delays must be at least 1");
        }
        for (label, spec) in &self.instruction_set {
            if !self.functional_units.contains_key(&spec.functional_unit) {
                bail!(
                    "instruction `{}` uses undeclared functional unit `{}`",
                    label,
                    spec.functional_unit
                );
            }
        }
        Ok(())
    }
}
