// Scoreboarding scenarios driven through the whole simulator

use std::collections::BTreeMap;

use scoreboard_rs::scoreboard::{Field, FuRef};
use scoreboard_rs::{
    default_architecture, parse_program, Architecture, ParseOption, Scoreboard, Stage, Trace,
};

/// The classic walkthrough: loads feeding a multiply, a subtract and a
/// long-latency divide, with WAR and WAW traffic on F6 and F8.
const DEMO: &str = "\
l.d   F6, 34(R2)
l.d   F2, 45(R3)
mul.d F0, F2, F4
sub.d F8, F6, F2
div.d F10, F0, F6
add.d F6, F8, F2
";

fn run_on(src: &str, arch: Architecture, five_stage: bool) -> anyhow::Result<Trace> {
    let program = parse_program(src, &arch, ParseOption::default())?;
    let mut sb = Scoreboard::new(five_stage);
    sb.load_architecture(arch)?;
    sb.load_instructions(program)?;
    sb.run()
}

/// Stage completion clocks of instruction `index`, in pipeline order.
fn cycles_of(trace: &Trace, index: u64) -> Vec<u64> {
    let status = &trace.inst_status[&(index * trace.word_size)];
    trace.stages.iter().map(|stage| status[stage]).collect()
}

/// History value as of the end of cycle `clock`.
fn value_at<'t, T>(values: &'t [T], clocks: &[u64], clock: u64) -> &'t T {
    let mut index = 0;
    for (i, &c) in clocks.iter().enumerate() {
        if c <= clock {
            index = i;
        }
    }
    &values[index]
}

#[test]
fn test_single_load() -> anyhow::Result<()> {
    let trace = run_on("l.d F6, 34(R2)", default_architecture(), true)?;
    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 5, 7, 8]);
    assert_eq!(trace.cycles, 8);
    Ok(())
}

#[test]
fn test_independent_loads_issue_in_order() -> anyhow::Result<()> {
    let mut arch = default_architecture();
    arch.functional_units.get_mut("integer_alu").unwrap().quantity = 2;
    let trace = run_on("l.d F0, 0(R1)\nl.d F2, 0(R4)", arch, true)?;

    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 5, 7, 8]);
    // a replica is free, yet the in-order window holds issue back a cycle
    assert_eq!(cycles_of(&trace, 1), vec![2, 4, 6, 8, 9]);
    Ok(())
}

#[test]
fn test_raw_stalls_read_operands() -> anyhow::Result<()> {
    let trace = run_on(
        "l.d F0, 0(R1)\nadd.d F4, F0, F2",
        default_architecture(),
        true,
    )?;

    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 5, 7, 8]);
    assert_eq!(cycles_of(&trace, 1), vec![2, 9, 12, 14, 15]);
    assert!(
        trace.inst_status[&4][&Stage::ReadOperands] > trace.inst_status[&0][&Stage::WriteResult]
    );
    Ok(())
}

#[test]
fn test_war_holds_write_result() -> anyhow::Result<()> {
    let mut arch = default_architecture();
    arch.functional_units
        .get_mut("float_add_sub")
        .unwrap()
        .quantity = 2;
    let src = "div.d F0, F2, F4\nadd.d F6, F0, F8\nsub.d F8, F10, F14";
    let trace = run_on(src, arch, true)?;

    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 44, 46, 47]);
    assert_eq!(cycles_of(&trace, 1), vec![2, 48, 51, 53, 54]);
    // the subtract is long done executing but may not overwrite F8
    // before the earlier add has taken its operands
    assert_eq!(cycles_of(&trace, 2), vec![3, 5, 8, 49, 50]);
    assert!(
        trace.inst_status[&8][&Stage::WriteResult] > trace.inst_status[&4][&Stage::ReadOperands]
    );
    Ok(())
}

#[test]
fn test_waw_holds_issue() -> anyhow::Result<()> {
    let trace = run_on(
        "mul.d F0, F2, F4\nadd.d F0, F6, F8",
        default_architecture(),
        true,
    )?;

    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 14, 16, 17]);
    assert_eq!(cycles_of(&trace, 1), vec![17, 19, 22, 24, 25]);
    assert!(trace.inst_status[&4][&Stage::Issue] > trace.inst_status[&0][&Stage::WriteResult]);
    Ok(())
}

#[test]
fn test_structural_hazard_holds_issue() -> anyhow::Result<()> {
    let src = "mul.d F0, F2, F4\nmul.d F6, F8, F10\nmul.d F12, F2, F4";
    let trace = run_on(src, default_architecture(), true)?;

    assert_eq!(trace.inst_status[&0][&Stage::Issue], 1);
    assert_eq!(trace.inst_status[&4][&Stage::Issue], 2);
    // both multiplier replicas are taken until the first one retires
    assert_eq!(trace.inst_status[&8][&Stage::Issue], 17);
    assert!(trace.inst_status[&8][&Stage::Issue] > trace.inst_status[&0][&Stage::WriteResult]);

    // never more in-flight multiplies than replicas
    let in_flight = |pc: u64, clock: u64| {
        let status = &trace.inst_status[&pc];
        status[&Stage::Issue] < clock && clock <= status[&Stage::WriteResult]
    };
    for clock in 1..=trace.cycles {
        let count = [0u64, 4, 8].iter().filter(|&&pc| in_flight(pc, clock)).count();
        assert!(count <= 2, "3 multiplies in flight at clock {clock}");
    }
    Ok(())
}

#[test]
fn test_four_stage_mode_reads_one_cycle_after_write() -> anyhow::Result<()> {
    let trace = run_on(
        "l.d F0, 0(R1)\nadd.d F4, F0, F2",
        default_architecture(),
        false,
    )?;

    assert_eq!(trace.stages.len(), 4);
    assert_eq!(cycles_of(&trace, 0), vec![1, 3, 5, 7]);
    // ready flags land with write_result, one cycle earlier than in the
    // five-stage model
    assert_eq!(cycles_of(&trace, 1), vec![2, 8, 11, 13]);
    Ok(())
}

#[test]
fn test_program_order_and_hazard_properties() -> anyhow::Result<()> {
    let trace = run_on(DEMO, default_architecture(), true)?;

    // issue strictly follows program order
    let issues: Vec<u64> = (0..6)
        .map(|i| trace.inst_status[&(i * trace.word_size)][&Stage::Issue])
        .collect();
    assert!(issues.windows(2).all(|w| w[0] < w[1]), "issues: {issues:?}");

    // stage completions strictly increase along the pipeline
    for status in trace.inst_status.values() {
        let cycles: Vec<u64> = trace.stages.iter().map(|stage| status[stage]).collect();
        assert!(cycles.windows(2).all(|w| w[0] < w[1]), "cycles: {cycles:?}");
    }

    // RAW: everything sourcing F2 reads after the second load wrote it
    let write_f2 = trace.inst_status[&4][&Stage::WriteResult];
    for reader in [8u64, 12, 20] {
        assert!(trace.inst_status[&reader][&Stage::ReadOperands] >= write_f2 + 1);
    }

    // WAR: the final add writes F6 only after the divide has read it
    assert!(
        trace.inst_status[&20][&Stage::WriteResult] > trace.inst_status[&16][&Stage::ReadOperands]
    );

    // WAW: the first load and the final add both target F6
    assert!(trace.inst_status[&20][&Stage::Issue] > trace.inst_status[&0][&Stage::WriteResult]);
    Ok(())
}

#[test]
fn test_register_table_matches_busy_writers() -> anyhow::Result<()> {
    let trace = run_on(DEMO, default_architecture(), true)?;

    for &clock in &trace.update_timers {
        let mut writers: BTreeMap<&str, Vec<FuRef>> = BTreeMap::new();
        for (unit, replicas) in &trace.func_units {
            for (replica, rep) in replicas.iter().enumerate() {
                let busy = *value_at(&rep.busy, &rep.appearance_clocks(Field::Busy), clock);
                let f_i = value_at(&rep.f_i, &rep.appearance_clocks(Field::FI), clock);
                if busy {
                    if let Some(reg) = f_i {
                        writers.entry(reg).or_default().push(FuRef {
                            unit: unit.clone(),
                            replica,
                        });
                    }
                }
            }
        }
        for (reg, hist) in &trace.reg_result {
            let producer = value_at(&hist.producers, &hist.clocks, clock);
            match writers.get(reg.as_str()) {
                Some(list) => {
                    assert_eq!(list.len(), 1, "register {reg} has several busy writers at clock {clock}");
                    assert_eq!(
                        producer.as_ref(),
                        Some(&list[0]),
                        "register {reg} does not name its busy writer at clock {clock}"
                    );
                }
                None => assert!(
                    producer.is_none(),
                    "register {reg} is claimed without a busy writer at clock {clock}"
                ),
            }
        }
    }
    Ok(())
}
