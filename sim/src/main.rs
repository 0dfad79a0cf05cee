#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::{Path, PathBuf};
use vcpu16::sim::Sim;
use vsim16::{Harness, RunOutcome, Script};

#[derive(Debug)]
enum Error {
    Io(std::io::Error, std::path::PathBuf),
    Decode(vcpu16::DecodeError),
    Tick(vcpu16::TickError),
    Yaml(serde_yaml::Error),
    BudgetExhausted(u64),
    UartMismatch { expected: Vec<u16>, actual: Vec<u16> },
    NonZeroExit(u16),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading \"{}\" failed: {}", path.display(), err),
            Error::Decode(err) => write!(f, "decode failed: {}", err),
            Error::Tick(err) => write!(f, "{}", err),
            Error::Yaml(err) => write!(f, "parsing YAML test script failed: {}", err),
            Error::BudgetExhausted(budget) => write!(f, "tick budget of {} exhausted before reaching @@END@@", budget),
            Error::UartMismatch { expected, actual } => {
                write!(f, "UART output mismatch: expected {:?}, got {:?}", expected, actual)
            }
            Error::NonZeroExit(code) => write!(f, "program exited with non-zero code {}", code),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(Arg::with_name("PROGRAM").help("Sets the binary program file to run").required(true).index(1))
        .arg(
            Arg::with_name("ticks")
                .short("t")
                .long("ticks")
                .takes_value(true)
                .value_name("BUDGET")
                .help("Sets the tick budget (default 5000)"),
        )
        .arg(
            Arg::with_name("yaml")
                .short("y")
                .long("yaml")
                .takes_value(true)
                .value_name("SCRIPT")
                .help("Sets the YAML test script to drive UART/pin input and check UART output"),
        )
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Prints the UART trace on success"))
        .get_matches();

    let program = matches.value_of("PROGRAM").unwrap();
    let budget: u64 = matches
        .value_of("ticks")
        .map(|s| s.parse().unwrap_or(5000))
        .unwrap_or(5000);
    let script = matches.value_of("yaml");
    let verbose = matches.is_present("verbose");

    if let Err(err) = vsim(program, budget, script, verbose) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn vsim(program: &str, budget: u64, script_path: Option<&str>, verbose: bool) -> Result<(), Error> {
    let path = Path::new(program);
    let image = vrom16::read_file(path).map_err(|err| Error::Io(err, path.to_owned()))?;

    let script = match script_path {
        Some(p) => {
            let text = std::fs::read_to_string(p).map_err(|err| Error::Io(err, PathBuf::from(p)))?;
            serde_yaml::from_str(&text).map_err(Error::Yaml)?
        }
        None => Script::default(),
    };

    let mut harness =
        Harness::with_input(image.words(), script.input.clone(), script.input_pin.clone()).map_err(Error::Decode)?;
    let mut sim = Sim::new();

    let outcome = harness.run(&mut sim, budget).map_err(Error::Tick)?;
    let exit_code = match outcome {
        RunOutcome::Exited(code) => code,
        RunOutcome::BudgetExhausted => return Err(Error::BudgetExhausted(budget)),
    };

    if !script.output.is_empty() && harness.uart_out() != script.output.as_slice() {
        return Err(Error::UartMismatch { expected: script.output, actual: harness.uart_out().to_vec() });
    }

    if exit_code != 0 {
        return Err(Error::NonZeroExit(exit_code));
    }

    if verbose {
        println!("ran {} ticks, exit code {}, uart_out: {:?}", budget, exit_code, harness.uart_out());
    }

    Ok(())
}
