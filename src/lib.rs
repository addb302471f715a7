mod arch;
mod asm;
mod isa;
mod render;
pub mod scoreboard;
mod utils;

pub use arch::{Architecture, FuncUnit, InstKind, InstSpec, Stage, StageDelay};
pub use asm::{parse_program, Inst, ParseOption, Program};
pub use isa::default_architecture;
pub use render::{RenderOption, TextView};
pub use scoreboard::{Scoreboard, Trace};
pub use utils::logging_setup;

#[cfg(test)]
mod tests {
    use crate::{default_architecture, parse_program, ParseOption, Scoreboard};

    #[test]
    fn test_demo_trace() {
        let arch = default_architecture();
        let program =
            parse_program(crate::asm::tests::DEMO_ASM, &arch, ParseOption::default()).unwrap();
        let mut sb = Scoreboard::new(true);
        sb.load_architecture(arch).unwrap();
        sb.load_instructions(program).unwrap();
        let trace = sb.run().unwrap();
        dbg!(&trace.update_timers);
        eprintln!("{:?}", trace.inst_status);
    }
}
