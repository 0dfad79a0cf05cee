#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::{Path, PathBuf};
use vgen16::{generate, Bias, GenError};

#[derive(Debug)]
enum IoErrorContext {
    ReadBias,
    WriteAssembly,
    WriteScript,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error, IoErrorContext, PathBuf),
    Yaml(serde_yaml::Error, PathBuf),
    Gen(GenError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IoErrorContext::ReadBias => "reading bias",
                    IoErrorContext::WriteAssembly => "writing assembly",
                    IoErrorContext::WriteScript => "writing script",
                },
                path.display(),
                err
            ),
            Error::Yaml(err, path) => write!(f, "parsing bias YAML \"{}\" failed: {}", path.display(), err),
            Error::Gen(err) => write!(f, "generation failed: {}", err),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the output assembly file to write to (default gen.vasm)"),
        )
        .arg(
            Arg::with_name("bias")
                .short("b")
                .long("bias")
                .takes_value(true)
                .value_name("BIAS")
                .help("Sets the mnemonic weight YAML file"),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .takes_value(true)
                .value_name("SEED")
                .help("Sets the RNG seed (default 0xdeadbeef)"),
        )
        .arg(
            Arg::with_name("count")
                .short("n")
                .long("count")
                .takes_value(true)
                .value_name("COUNT")
                .help("Sets the number of body instructions to generate (default 200)"),
        )
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Prints the generated instruction count on success"))
        .get_matches();

    let output = matches.value_of("output").unwrap_or("gen.vasm");
    let bias = matches.value_of("bias");
    let seed = matches
        .value_of("seed")
        .map(|s| parse_seed(s).unwrap_or(0xdead_beef))
        .unwrap_or(0xdead_beef);
    let count: u32 = matches.value_of("count").map(|s| s.parse().unwrap_or(200)).unwrap_or(200);
    let verbose = matches.is_present("verbose");

    if let Err(err) = vgen(output, bias, seed, count, verbose) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn parse_seed(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn vgen(output: &str, bias_path: Option<&str>, seed: u64, count: u32, verbose: bool) -> Result<(), Error> {
    let bias = match bias_path {
        Some(p) => {
            let path = Path::new(p);
            let text = std::fs::read_to_string(path).map_err(|err| Error::Io(err, IoErrorContext::ReadBias, path.to_owned()))?;
            serde_yaml::from_str(&text).map_err(|err| Error::Yaml(err, path.to_owned()))?
        }
        None => Bias::default(),
    };

    let generated = generate(&bias, seed, count).map_err(Error::Gen)?;

    let output_path = Path::new(output);
    std::fs::write(output_path, &generated.assembly)
        .map_err(|err| Error::Io(err, IoErrorContext::WriteAssembly, output_path.to_owned()))?;

    let script_path = output_path.with_extension("yaml");
    let script_text = serde_yaml::to_string(&generated.script).expect("Script always serializes");
    std::fs::write(&script_path, &script_text).map_err(|err| Error::Io(err, IoErrorContext::WriteScript, script_path.clone()))?;

    if verbose {
        let instr_count = generated.assembly.lines().filter(|l| !l.is_empty() && !l.starts_with('.') && !l.starts_with('#')).count();
        println!(
            "wrote {} instructions to \"{}\" and a script to \"{}\"",
            instr_count,
            output_path.display(),
            script_path.display()
        );
    }

    Ok(())
}
