//! Append-only bookkeeping state for functional unit replicas and the
//! register result table, plus the per-cycle staging buffer that makes
//! commits atomic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifies one replica of a functional unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuRef {
    pub unit: String,
    pub replica: usize,
}

impl fmt::Display for FuRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit, self.replica)
    }
}

/// Bookkeeping fields of a replica, in table column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Busy,
    Op,
    FI,
    FJ,
    FK,
    QJ,
    QK,
    RJ,
    RK,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Busy,
        Field::Op,
        Field::FI,
        Field::FJ,
        Field::FK,
        Field::QJ,
        Field::QK,
        Field::RJ,
        Field::RK,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Busy => "busy",
            Field::Op => "op",
            Field::FI => "f_i",
            Field::FJ => "f_j",
            Field::FK => "f_k",
            Field::QJ => "q_j",
            Field::QK => "q_k",
            Field::RJ => "r_j",
            Field::RK => "r_k",
        }
    }
}

/// A value staged for one field. The variant must agree with the field it
/// is staged for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `busy`, `r_j`, `r_k`
    Flag(bool),
    /// `op`
    Pc(Option<u64>),
    /// `f_i`, `f_j`, `f_k`
    Reg(Option<String>),
    /// `q_j`, `q_k`; `None` is the table's "0", operand ready
    Unit(Option<FuRef>),
}

/// One committed change-set on a replica: the clock it happened at and
/// which fields and registers it touched.
#[derive(Debug, Clone)]
pub struct UpdateEntry {
    pub clock: u64,
    pub changed_fields: BTreeSet<Field>,
    pub changed_registers: BTreeSet<String>,
}

/// Scoreboard state of a single replica. Every field keeps its full
/// history; index 0 is the pre-simulation seed and `update_timers[k]`
/// records the commit that produced append `k + 1` of each field it names.
#[derive(Debug, Clone)]
pub struct ReplicaState {
    pub busy: Vec<bool>,
    pub op: Vec<Option<u64>>,
    pub f_i: Vec<Option<String>>,
    pub f_j: Vec<Option<String>>,
    pub f_k: Vec<Option<String>>,
    pub q_j: Vec<Option<FuRef>>,
    pub q_k: Vec<Option<FuRef>>,
    pub r_j: Vec<bool>,
    pub r_k: Vec<bool>,
    pub update_timers: Vec<UpdateEntry>,
}

impl Default for ReplicaState {
    fn default() -> Self {
        Self {
            busy: vec![false],
            op: vec![None],
            f_i: vec![None],
            f_j: vec![None],
            f_k: vec![None],
            q_j: vec![None],
            q_k: vec![None],
            r_j: vec![true],
            r_k: vec![true],
            update_timers: Vec::new(),
        }
    }
}

impl ReplicaState {
    pub fn busy_now(&self) -> bool {
        self.busy[self.busy.len() - 1]
    }

    pub fn f_j_now(&self) -> Option<&String> {
        self.f_j[self.f_j.len() - 1].as_ref()
    }

    pub fn f_k_now(&self) -> Option<&String> {
        self.f_k[self.f_k.len() - 1].as_ref()
    }

    pub fn q_j_now(&self) -> Option<&FuRef> {
        self.q_j[self.q_j.len() - 1].as_ref()
    }

    pub fn q_k_now(&self) -> Option<&FuRef> {
        self.q_k[self.q_k.len() - 1].as_ref()
    }

    pub fn r_j_now(&self) -> bool {
        self.r_j[self.r_j.len() - 1]
    }

    pub fn r_k_now(&self) -> bool {
        self.r_k[self.r_k.len() - 1]
    }

    pub fn history_len(&self, field: Field) -> usize {
        match field {
            Field::Busy => self.busy.len(),
            Field::Op => self.op.len(),
            Field::FI => self.f_i.len(),
            Field::FJ => self.f_j.len(),
            Field::FK => self.f_k.len(),
            Field::QJ => self.q_j.len(),
            Field::QK => self.q_k.len(),
            Field::RJ => self.r_j.len(),
            Field::RK => self.r_k.len(),
        }
    }

    /// Commit clocks of each history entry of `field`, the seed included.
    pub fn appearance_clocks(&self, field: Field) -> Vec<u64> {
        let mut clocks = vec![0];
        for entry in &self.update_timers {
            if entry.changed_fields.contains(&field) {
                clocks.push(entry.clock);
            }
        }
        clocks
    }

    /// Table text of history entry `index` of `field`. Absent values render
    /// as `-`, unit references as `unit_replica`.
    pub fn cell(&self, field: Field, index: usize) -> String {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            match v {
                Some(v) => v.to_string(),
                None => "-".to_string(),
            }
        }
        match field {
            Field::Busy => self.busy[index].to_string(),
            Field::Op => opt(&self.op[index]),
            Field::FI => opt(&self.f_i[index]),
            Field::FJ => opt(&self.f_j[index]),
            Field::FK => opt(&self.f_k[index]),
            Field::QJ => opt(&self.q_j[index]),
            Field::QK => opt(&self.q_k[index]),
            Field::RJ => self.r_j[index].to_string(),
            Field::RK => self.r_k[index].to_string(),
        }
    }

    /// Append every staged field and stamp an update timer. No timer entry
    /// is produced for an empty patch.
    pub fn apply(&mut self, clock: u64, patch: &ReplicaPatch) {
        if patch.fields.is_empty() && patch.registers.is_empty() {
            return;
        }
        let mut changed_fields = BTreeSet::new();
        for (field, value) in &patch.fields {
            match (field, value) {
                (Field::Busy, FieldValue::Flag(b)) => self.busy.push(*b),
                (Field::Op, FieldValue::Pc(pc)) => self.op.push(*pc),
                (Field::FI, FieldValue::Reg(r)) => self.f_i.push(r.clone()),
                (Field::FJ, FieldValue::Reg(r)) => self.f_j.push(r.clone()),
                (Field::FK, FieldValue::Reg(r)) => self.f_k.push(r.clone()),
                (Field::QJ, FieldValue::Unit(q)) => self.q_j.push(q.clone()),
                (Field::QK, FieldValue::Unit(q)) => self.q_k.push(q.clone()),
                (Field::RJ, FieldValue::Flag(b)) => self.r_j.push(*b),
                (Field::RK, FieldValue::Flag(b)) => self.r_k.push(*b),
                (field, value) => {
                    unreachable!("staged {value:?} does not fit field {field:?}")
                }
            }
            changed_fields.insert(*field);
        }
        self.update_timers.push(UpdateEntry {
            clock,
            changed_fields,
            changed_registers: patch.registers.keys().cloned().collect(),
        });
    }
}

/// Register result table entry history: which replica, if any, will write
/// the register, and when each hand-over was committed.
#[derive(Debug, Clone)]
pub struct RegHistory {
    pub producers: Vec<Option<FuRef>>,
    pub clocks: Vec<u64>,
}

impl Default for RegHistory {
    fn default() -> Self {
        Self {
            producers: vec![None],
            clocks: vec![0],
        }
    }
}

impl RegHistory {
    pub fn now(&self) -> Option<&FuRef> {
        self.producers[self.producers.len() - 1].as_ref()
    }

    pub fn push(&mut self, clock: u64, producer: Option<FuRef>) {
        self.producers.push(producer);
        self.clocks.push(clock);
    }

    /// True if some commit ever claimed the register.
    pub fn touched(&self) -> bool {
        self.producers.len() > 1
    }
}

/// Mutations staged for one replica within a cycle.
#[derive(Debug, Clone, Default)]
pub struct ReplicaPatch {
    pub fields: BTreeMap<Field, FieldValue>,
    pub registers: BTreeMap<String, Option<FuRef>>,
}

/// Per-cycle staging buffer. Hazard checks only ever read committed state,
/// so stages firing in the same cycle cannot observe each other; the whole
/// buffer lands at the end of the cycle, replicas in unit-name order and
/// ascending replica id.
#[derive(Debug, Default)]
pub struct CycleStaging {
    pub patches: BTreeMap<FuRef, ReplicaPatch>,
}

impl CycleStaging {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn field(&mut self, fu: &FuRef, field: Field, value: FieldValue) {
        self.patches
            .entry(fu.clone())
            .or_default()
            .fields
            .insert(field, value);
    }

    pub fn register(&mut self, fu: &FuRef, reg: &str, producer: Option<FuRef>) {
        self.patches
            .entry(fu.clone())
            .or_default()
            .registers
            .insert(reg.to_string(), producer);
    }
}
