//! The scoreboard execution engine.
//!
//! A single clock counter drives the simulation. Each cycle walks the
//! active instructions in program order, fires every stage whose hazard
//! check passes against the committed state, and lands all staged
//! mutations at once, so two stages firing in the same cycle never see
//! each other's effects.

mod history;

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Result};
use tracing::debug;

use crate::arch::{Architecture, Stage};
use crate::asm::{Inst, Program};

pub use history::{
    CycleStaging, Field, FieldValue, FuRef, RegHistory, ReplicaPatch, ReplicaState, UpdateEntry,
};

/// Hard stop for the cycle loop; any well-formed input retires far below.
const CYCLE_LIMIT: u64 = 1_000_000;

/// Immutable result of a scoreboard run.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Pipeline stages in firing order.
    pub stages: Vec<Stage>,
    /// Completion clock of every fired stage, per instruction PC.
    pub inst_status: BTreeMap<u64, BTreeMap<Stage, u64>>,
    /// Full bookkeeping history of every replica, per unit.
    pub func_units: BTreeMap<String, Vec<ReplicaState>>,
    /// Register result table history.
    pub reg_result: BTreeMap<String, RegHistory>,
    /// Clocks at which any commit happened.
    pub update_timers: Vec<u64>,
    /// Clock at which the last instruction retired.
    pub cycles: u64,
    pub word_size: u64,
}

/// The scoreboard: load an architecture and a program, then run the cycle
/// loop to completion.
pub struct Scoreboard {
    five_stage: bool,
    arch: Option<Architecture>,
    program: Option<Program>,
}

impl Scoreboard {
    /// `five_stage` enables the trailing `update_flags` stage, which
    /// separates retirement from operand-ready propagation. Without it the
    /// propagation folds into `write_result`.
    pub fn new(five_stage: bool) -> Self {
        Self {
            five_stage,
            arch: None,
            program: None,
        }
    }

    /// Pipeline stages of the configured model, in firing order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![
            Stage::Issue,
            Stage::ReadOperands,
            Stage::Execution,
            Stage::WriteResult,
        ];
        if self.five_stage {
            stages.push(Stage::UpdateFlags);
        }
        stages
    }

    pub fn load_architecture(&mut self, arch: Architecture) -> Result<()> {
        arch.validate()?;
        self.arch = Some(arch);
        Ok(())
    }

    pub fn load_instructions(&mut self, program: Program) -> Result<()> {
        let arch = match &self.arch {
            Some(arch) => arch,
            None => bail!("no architecture loaded, call load_architecture first"),
        };
        ensure!(!program.insts.is_empty(), "program has no instructions");
        ensure!(
            program.word_size == arch.word_size,
            "program word size {} does not match the architecture's {}",
            program.word_size,
            arch.word_size
        );
        for inst in &program.insts {
            ensure!(
                arch.functional_units.contains_key(&inst.unit),
                "instruction `{}` targets unknown functional unit `{}`",
                inst.label,
                inst.unit
            );
        }
        self.program = Some(program);
        Ok(())
    }

    pub fn run(&mut self) -> Result<Trace> {
        let arch = match &self.arch {
            Some(arch) => arch,
            None => bail!("no architecture loaded, call load_architecture first"),
        };
        let program = match &self.program {
            Some(program) => program,
            None => bail!("no program loaded, call load_instructions first"),
        };
        Engine::new(arch, program, self.stages()).run()
    }
}

/// Mutable state of one run, borrowed from the loaded scoreboard.
struct Engine<'a> {
    arch: &'a Architecture,
    program: &'a Program,
    stages: Vec<Stage>,
    clock: u64,
    func_units: BTreeMap<String, Vec<ReplicaState>>,
    reg_result: BTreeMap<String, RegHistory>,
    inst_status: BTreeMap<u64, BTreeMap<Stage, u64>>,
    /// Next stage (index into `stages`) per active PC.
    inst_stage: BTreeMap<u64, usize>,
    /// Replica owning each issued instruction.
    owners: BTreeMap<u64, FuRef>,
    /// PC of the next instruction to admit into the issue window.
    next_admit: u64,
    min_pc: u64,
    max_pc: u64,
    update_timers: Vec<u64>,
}

impl<'a> Engine<'a> {
    fn new(arch: &'a Architecture, program: &'a Program, stages: Vec<Stage>) -> Self {
        let func_units = arch
            .functional_units
            .iter()
            .map(|(name, unit)| (name.clone(), vec![ReplicaState::default(); unit.quantity]))
            .collect();
        // the register table covers the declared set plus whatever the
        // program names when register checking was off
        let mut reg_result: BTreeMap<String, RegHistory> = arch
            .registers
            .iter()
            .map(|reg| (reg.clone(), RegHistory::default()))
            .collect();
        for inst in &program.insts {
            for reg in [&inst.dest, &inst.src_j, &inst.src_k].into_iter().flatten() {
                reg_result.entry(reg.clone()).or_default();
            }
        }
        let inst_status = (0..program.insts.len())
            .map(|i| (program.pc(i), BTreeMap::new()))
            .collect();
        Self {
            arch,
            program,
            stages,
            clock: 0,
            func_units,
            reg_result,
            inst_status,
            inst_stage: BTreeMap::from([(0, 0)]),
            owners: BTreeMap::new(),
            next_admit: program.word_size,
            min_pc: 0,
            max_pc: 0,
            update_timers: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Trace> {
        let program_size = self.program.size();
        while self.min_pc < program_size {
            self.clock += 1;
            ensure!(
                self.clock <= CYCLE_LIMIT,
                "simulation did not finish within {CYCLE_LIMIT} cycles"
            );

            let mut staging = CycleStaging::default();
            let active: Vec<(u64, usize)> = self
                .inst_stage
                .range(self.min_pc..=self.max_pc)
                .map(|(&pc, &stage_idx)| (pc, stage_idx))
                .collect();
            for (pc, stage_idx) in active {
                if !self.check_ready(pc, stage_idx) {
                    continue;
                }
                let stage = self.stages[stage_idx];
                self.bookkeep(pc, stage, &mut staging);
                debug!(clock = self.clock, pc, stage = stage.name(), "stage fired");
                self.inst_status
                    .get_mut(&pc)
                    .expect("active pc has a status row")
                    .insert(stage, self.clock);
                if stage_idx + 1 == self.stages.len() {
                    self.inst_stage.remove(&pc);
                } else {
                    self.inst_stage.insert(pc, stage_idx + 1);
                }
            }
            self.commit(staging);
            self.advance_window(program_size);
        }

        Ok(Trace {
            stages: self.stages,
            inst_status: self.inst_status,
            func_units: self.func_units,
            reg_result: self.reg_result,
            update_timers: self.update_timers,
            cycles: self.clock,
            word_size: self.program.word_size,
        })
    }

    fn inst(&self, pc: u64) -> &'a Inst {
        &self.program.insts[(pc / self.program.word_size) as usize]
    }

    fn owner(&self, pc: u64) -> &FuRef {
        &self.owners[&pc]
    }

    fn replica(&self, fu: &FuRef) -> &ReplicaState {
        &self.func_units[&fu.unit][fu.replica]
    }

    fn five_stage(&self) -> bool {
        self.stages.contains(&Stage::UpdateFlags)
    }

    fn stage_cost(&self, pc: u64, stage: Stage) -> u64 {
        match stage {
            Stage::Issue | Stage::UpdateFlags => 0,
            Stage::ReadOperands => self.arch.stage_delay.read_operands,
            Stage::WriteResult => self.arch.stage_delay.write_result,
            Stage::Execution => {
                let inst = self.inst(pc);
                self.arch.functional_units[&inst.unit].clock_cycles + inst.extra_cost
            }
        }
    }

    /// Earliest clock at which the stage may fire: the previous stage's
    /// completion, the stage cost, and the commit boundary in between.
    fn ready_clock(&self, pc: u64, stage_idx: usize) -> u64 {
        let prev = self.stages[stage_idx - 1];
        let t_prev = self.inst_status[&pc][&prev];
        t_prev + self.stage_cost(pc, self.stages[stage_idx]) + 1
    }

    /// Evaluate the stage's gating condition against the committed state.
    fn check_ready(&self, pc: u64, stage_idx: usize) -> bool {
        match self.stages[stage_idx] {
            Stage::Issue => self.issue_ready(pc),
            _ if self.clock < self.ready_clock(pc, stage_idx) => false,
            Stage::ReadOperands => {
                let rep = self.replica(self.owner(pc));
                rep.r_j_now() && rep.r_k_now()
            }
            Stage::Execution | Stage::UpdateFlags => true,
            Stage::WriteResult => self.war_clear(pc),
        }
    }

    /// Structural and WAW gate: a replica is idle and no in-flight
    /// instruction already claims the destination register.
    fn issue_ready(&self, pc: u64) -> bool {
        let inst = self.inst(pc);
        let idle = self.func_units[&inst.unit].iter().any(|r| !r.busy_now());
        let claim_free = match &inst.dest {
            Some(dest) => self.reg_result[dest].now().is_none(),
            None => true,
        };
        idle && claim_free
    }

    /// WAR gate: no other replica still waits to read the register this
    /// writer is about to release.
    fn war_clear(&self, pc: u64) -> bool {
        let dest = match &self.inst(pc).dest {
            Some(dest) => dest,
            None => return true,
        };
        let me = self.owner(pc);
        for (unit, replicas) in &self.func_units {
            for (replica, rep) in replicas.iter().enumerate() {
                if unit == &me.unit && replica == me.replica {
                    continue;
                }
                if (rep.f_j_now() == Some(dest) && rep.r_j_now())
                    || (rep.f_k_now() == Some(dest) && rep.r_k_now())
                {
                    return false;
                }
            }
        }
        true
    }

    fn bookkeep(&mut self, pc: u64, stage: Stage, staging: &mut CycleStaging) {
        match stage {
            Stage::Issue => self.book_issue(pc, staging),
            Stage::ReadOperands => {
                let fu = self.owner(pc).clone();
                staging.field(&fu, Field::QJ, FieldValue::Unit(None));
                staging.field(&fu, Field::QK, FieldValue::Unit(None));
                staging.field(&fu, Field::RJ, FieldValue::Flag(false));
                staging.field(&fu, Field::RK, FieldValue::Flag(false));
            }
            // execution holds the unit but touches no bookkeeping state;
            // only the completion clock is recorded
            Stage::Execution => {}
            Stage::WriteResult => {
                let fu = self.owner(pc).clone();
                staging.field(&fu, Field::Busy, FieldValue::Flag(false));
                if let Some(dest) = &self.inst(pc).dest {
                    staging.register(&fu, dest, None);
                }
                if !self.five_stage() {
                    self.propagate_ready(&fu, staging);
                }
            }
            Stage::UpdateFlags => {
                let fu = self.owner(pc).clone();
                self.propagate_ready(&fu, staging);
            }
        }
    }

    fn book_issue(&mut self, pc: u64, staging: &mut CycleStaging) {
        let inst = self.inst(pc);
        let replica = self.func_units[&inst.unit]
            .iter()
            .position(|r| !r.busy_now())
            .expect("issue fired with an idle replica");
        let fu = FuRef {
            unit: inst.unit.clone(),
            replica,
        };
        let q_j = inst
            .src_j
            .as_ref()
            .and_then(|reg| self.reg_result[reg].now().cloned());
        let q_k = inst
            .src_k
            .as_ref()
            .and_then(|reg| self.reg_result[reg].now().cloned());
        staging.field(&fu, Field::Busy, FieldValue::Flag(true));
        staging.field(&fu, Field::Op, FieldValue::Pc(Some(pc)));
        staging.field(&fu, Field::FI, FieldValue::Reg(inst.dest.clone()));
        staging.field(&fu, Field::FJ, FieldValue::Reg(inst.src_j.clone()));
        staging.field(&fu, Field::FK, FieldValue::Reg(inst.src_k.clone()));
        staging.field(&fu, Field::RJ, FieldValue::Flag(q_j.is_none()));
        staging.field(&fu, Field::RK, FieldValue::Flag(q_k.is_none()));
        staging.field(&fu, Field::QJ, FieldValue::Unit(q_j));
        staging.field(&fu, Field::QK, FieldValue::Unit(q_k));
        if let Some(dest) = &inst.dest {
            staging.register(&fu, dest, Some(fu.clone()));
        }
        self.owners.insert(pc, fu);
    }

    /// Flip the source-ready flag of every replica waiting on `producer`.
    fn propagate_ready(&self, producer: &FuRef, staging: &mut CycleStaging) {
        for (unit, replicas) in &self.func_units {
            for (replica, rep) in replicas.iter().enumerate() {
                let fu = FuRef {
                    unit: unit.clone(),
                    replica,
                };
                if rep.q_j_now() == Some(producer) {
                    staging.field(&fu, Field::RJ, FieldValue::Flag(true));
                }
                if rep.q_k_now() == Some(producer) {
                    staging.field(&fu, Field::RK, FieldValue::Flag(true));
                }
            }
        }
    }

    /// Land the cycle's staged mutations in one step, replicas in unit-name
    /// order and ascending id.
    fn commit(&mut self, staging: CycleStaging) {
        if staging.is_empty() {
            return;
        }
        self.update_timers.push(self.clock);
        for (fu, patch) in staging.patches {
            self.func_units
                .get_mut(&fu.unit)
                .expect("staged unit is declared")[fu.replica]
                .apply(self.clock, &patch);
            for (reg, producer) in patch.registers {
                self.reg_result
                    .get_mut(&reg)
                    .expect("staged register is known")
                    .push(self.clock, producer);
            }
        }
        debug!(clock = self.clock, "cycle committed");
    }

    /// Keep issue in program order: admit the next instruction only once
    /// every active one has at least issued, then recompute the window.
    fn advance_window(&mut self, program_size: u64) {
        if self.next_admit < program_size && self.inst_stage.values().all(|&s| s > 0) {
            self.inst_stage.insert(self.next_admit, 0);
            self.next_admit += self.program.word_size;
        }
        match (self.inst_stage.keys().next(), self.inst_stage.keys().next_back()) {
            (Some(&min), Some(&max)) => {
                self.min_pc = min;
                self.max_pc = max;
            }
            _ => {
                self.min_pc = program_size;
                self.max_pc = program_size;
            }
        }
    }
}
