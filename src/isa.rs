//! Embedded machine description of the simulated MIPS-like architecture.

use std::collections::BTreeMap;

use crate::arch::{Architecture, FuncUnit, InstKind, InstSpec, StageDelay};

macro_rules! unit_table {
    { $( $name:literal : $q:literal x $c:literal; )* } => {
        BTreeMap::from([ $((
            $name.to_string(),
            FuncUnit { quantity: $q, clock_cycles: $c },
        ),)* ])
    };
}

macro_rules! inst_table {
    { $( $label:literal => $unit:literal, $kind:ident; )* } => {
        BTreeMap::from([ $((
            $label.to_string(),
            InstSpec {
                functional_unit: $unit.to_string(),
                kind: InstKind::$kind,
            },
        ),)* ])
    };
}

/// The stock machine description: a CDC 6600 style functional unit mix over
/// a 4-byte-word MIPS register file.
pub fn default_architecture() -> Architecture {
    Architecture {
        functional_units: unit_table! {
            "integer_alu": 1 x 1;
            "float_add_sub": 1 x 2;
            "float_mult": 2 x 10;
            "float_div": 1 x 40;
        },
        stage_delay: StageDelay {
            issue: 1,
            read_operands: 1,
            write_result: 1,
        },
        extra_delay: BTreeMap::new(),
        word_size: 4,
        registers: (0..32)
            .map(|i| format!("F{i}"))
            .chain((0..32).map(|i| format!("R{i}")))
            .collect(),
        instruction_set: inst_table! {
            "add" => "integer_alu", R;
            "l.d" => "integer_alu", I;
            "mul.d" => "float_mult", R;
            "div.d" => "float_div", R;
            "add.d" => "float_add_sub", R;
            "sub.d" => "float_add_sub", R;
            "j" => "integer_alu", J;
        },
    }
}
