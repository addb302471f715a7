use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use scoreboard_rs::{
    default_architecture, logging_setup, parse_program, ParseOption, RenderOption, Scoreboard,
    TextView,
};

/// MIPS-style scoreboarding simulator written in rust
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to the assembly source file
    input: String,

    /// reject registers the architecture does not declare
    #[arg(long = "checkreg")]
    checkreg: bool,

    /// textual output (the only implemented interface)
    #[arg(long = "nogui")]
    nogui: bool,

    /// print the full per-cycle trace instead of the final table only
    #[arg(long = "complete")]
    complete: bool,

    /// plain output without terminal color codes
    #[arg(long = "nocolor")]
    nocolor: bool,

    /// four-stage compatibility mode without the update_flags stage
    #[arg(long = "noufstage")]
    noufstage: bool,

    /// pause for confirmation every N rendered cycles
    #[arg(long = "clockstep", value_name = "N",
          value_parser = clap::value_parser!(u64).range(1..))]
    clockstep: Option<u64>,

    /// print debug logs during simulation
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // asking for (or falling into) the usage text leaves with
            // code 1; malformed arguments keep clap's code 2
            let code = match err.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::MissingRequiredArgument => 1,
                _ => 2,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    logging_setup(log_level);

    if !args.nogui {
        tracing::warn!("no graphical interface is implemented, producing textual output");
    }

    let arch = default_architecture();
    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;
    let program = parse_program(
        &content,
        &arch,
        ParseOption::default().set_check_registers(args.checkreg),
    )?;

    let mut scoreboard = Scoreboard::new(!args.noufstage);
    scoreboard.load_architecture(arch)?;
    scoreboard.load_instructions(program)?;
    let trace = scoreboard.run()?;

    let view = TextView::new(
        &trace,
        RenderOption::default()
            .set_colored(!args.nocolor)
            .set_clockstep(args.clockstep),
    );
    if args.complete {
        view.print_full();
    } else {
        view.print_summary();
    }
    Ok(())
}
