//! Textual rendering of a scoreboard trace.
//!
//! The full mode replays the trace: one block of tables per committed
//! cycle, each cell read through a monotonic cursor into the matching
//! history so the table shows the value as of that cycle, with cells that
//! changed exactly then highlighted.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use ansi_term::Colour::{Green, Red};

use crate::scoreboard::{Field, FuRef, Trace};

pub struct RenderOption {
    colored: bool,
    clockstep: Option<u64>,
}

impl Default for RenderOption {
    fn default() -> Self {
        Self {
            colored: true,
            clockstep: None,
        }
    }
}

impl RenderOption {
    pub fn set_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Pause for confirmation every `every` rendered cycles.
    pub fn set_clockstep(mut self, every: Option<u64>) -> Self {
        self.clockstep = every;
        self
    }
}

/// Monotonic read position into one append-only history, keyed by the
/// commit clocks of its entries.
struct Cursor {
    clocks: Vec<u64>,
    index: usize,
}

impl Cursor {
    fn new(clocks: Vec<u64>) -> Self {
        Self { clocks, index: 0 }
    }

    /// Move to the last entry committed at or before `clock`.
    fn advance(&mut self, clock: u64) -> usize {
        while self.index + 1 < self.clocks.len() && self.clocks[self.index + 1] <= clock {
            self.index += 1;
        }
        self.index
    }

    fn changed_at(&self, clock: u64) -> bool {
        self.clocks[self.index] == clock
    }
}

const SEPARATOR_LEN: usize = 66;

pub struct TextView<'a> {
    trace: &'a Trace,
    option: RenderOption,
    pc_w: usize,
    stage_w: usize,
    label_w: usize,
    cell_w: usize,
    reg_w: usize,
}

impl<'a> TextView<'a> {
    pub fn new(trace: &'a Trace, option: RenderOption) -> Self {
        let max_pc = trace.inst_status.keys().next_back().copied().unwrap_or(0);
        let pc_w = max_pc.to_string().len().max("PC".len()) + 1;
        let stage_w = trace
            .stages
            .iter()
            .map(|s| s.name().len())
            .max()
            .unwrap_or(0)
            + 2;
        let longest_fu = trace
            .func_units
            .iter()
            .map(|(unit, replicas)| unit.len() + 1 + (replicas.len().saturating_sub(1)).to_string().len())
            .max()
            .unwrap_or(0);
        let label_w = longest_fu.max("functional unit".len()) + 2;
        let cell_w = Field::ALL
            .iter()
            .map(|f| f.name().len())
            .max()
            .unwrap_or(0)
            .max("false".len())
            .max(longest_fu)
            + 2;
        let reg_w = trace
            .reg_result
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("register".len())
            + 2;
        Self {
            trace,
            option,
            pc_w,
            stage_w,
            label_w,
            cell_w,
            reg_w,
        }
    }

    fn paint(&self, text: &str, width: usize, changed: bool) -> String {
        let cell = format!("{text:^width$}");
        if !self.option.colored || text.trim().is_empty() {
            return cell;
        }
        if changed {
            Green.paint(cell).to_string()
        } else {
            Red.paint(cell).to_string()
        }
    }

    fn print_inst_header(&self) {
        print!("{:<w$}:", "PC", w = self.pc_w);
        for stage in &self.trace.stages {
            print!("{:^w$}|", stage.name(), w = self.stage_w);
        }
        println!();
    }

    /// Print the instruction status table once, with the final completion
    /// cycle of every stage.
    pub fn print_summary(&self) {
        self.print_inst_header();
        for (pc, status) in &self.trace.inst_status {
            print!("{pc:<w$}:", w = self.pc_w);
            for stage in &self.trace.stages {
                match status.get(stage) {
                    Some(cycle) => print!("{cycle:^w$}|", w = self.stage_w),
                    None => print!("{:^w$}|", "-", w = self.stage_w),
                }
            }
            println!();
        }
    }

    /// Replay the whole trace, one block of tables per committed cycle
    /// plus a trailing final block.
    pub fn print_full(&self) {
        let last = match self.trace.update_timers.last() {
            Some(&last) => last,
            None => return self.print_summary(),
        };

        let mut fu_cursors: BTreeMap<FuRef, Vec<Cursor>> = BTreeMap::new();
        for (unit, replicas) in &self.trace.func_units {
            for (replica, rep) in replicas.iter().enumerate() {
                let fu = FuRef {
                    unit: unit.clone(),
                    replica,
                };
                let cursors = Field::ALL
                    .iter()
                    .map(|&field| Cursor::new(rep.appearance_clocks(field)))
                    .collect();
                fu_cursors.insert(fu, cursors);
            }
        }
        let mut reg_cursors: BTreeMap<&String, Cursor> = self
            .trace
            .reg_result
            .iter()
            .map(|(reg, hist)| (reg, Cursor::new(hist.clocks.clone())))
            .collect();

        let clocks: Vec<u64> = self
            .trace
            .update_timers
            .iter()
            .copied()
            .chain([last + 1])
            .collect();
        for (i, &clock) in clocks.iter().enumerate() {
            let final_block = i + 1 == clocks.len();
            println!("{}", "~".repeat(SEPARATOR_LEN));
            if final_block {
                println!("Final state");
            } else {
                println!(
                    "State for clock cycle {clock} of {} total",
                    self.trace.cycles
                );
            }
            println!("{}", "~".repeat(SEPARATOR_LEN));

            println!("-> Instruction status:");
            self.print_inst_table(clock);
            println!("-> Functional unit status:");
            self.print_unit_table(clock, &mut fu_cursors);
            println!("-> Register result status:");
            self.print_reg_table(clock, &mut reg_cursors);
            println!();

            if let Some(every) = self.option.clockstep {
                if !final_block && (i as u64 + 1) % every == 0 {
                    pause();
                }
            }
        }
    }

    fn print_inst_table(&self, clock: u64) {
        self.print_inst_header();
        for (pc, status) in &self.trace.inst_status {
            print!("{pc:<w$}:", w = self.pc_w);
            for stage in &self.trace.stages {
                let cell = match status.get(stage) {
                    Some(&cycle) if cycle <= clock => {
                        self.paint(&cycle.to_string(), self.stage_w, cycle == clock)
                    }
                    _ => " ".repeat(self.stage_w),
                };
                print!("{cell}|");
            }
            println!();
        }
    }

    fn print_unit_table(&self, clock: u64, cursors: &mut BTreeMap<FuRef, Vec<Cursor>>) {
        print!("{:<w$}: ", "functional unit", w = self.label_w);
        for field in Field::ALL {
            print!("{:^w$}|", field.name(), w = self.cell_w);
        }
        println!();
        for (fu, field_cursors) in cursors.iter_mut() {
            let rep = &self.trace.func_units[&fu.unit][fu.replica];
            print!("{:<w$}: ", fu.to_string(), w = self.label_w);
            for (slot, field) in Field::ALL.into_iter().enumerate() {
                let cursor = &mut field_cursors[slot];
                let index = cursor.advance(clock);
                let cell = self.paint(&rep.cell(field, index), self.cell_w, cursor.changed_at(clock));
                print!("{cell}|");
            }
            println!();
        }
    }

    fn print_reg_table(&self, clock: u64, cursors: &mut BTreeMap<&String, Cursor>) {
        print!("{:<w$}: ", "register", w = self.reg_w);
        println!("{:^w$}|", "producer", w = self.cell_w);
        let mut omitted = 0usize;
        for (reg, hist) in &self.trace.reg_result {
            if !hist.touched() {
                omitted += 1;
                continue;
            }
            let cursor = cursors.get_mut(reg).expect("register has a cursor");
            let index = cursor.advance(clock);
            let text = match &hist.producers[index] {
                Some(fu) => fu.to_string(),
                None => "-".to_string(),
            };
            print!("{reg:<w$}: ", w = self.reg_w);
            println!("{}|", self.paint(&text, self.cell_w, cursor.changed_at(clock)));
        }
        if omitted > 0 {
            println!("[...] ({omitted} registers never claimed)");
        }
    }
}

fn pause() {
    print!("(clockstep) press enter to continue ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}
