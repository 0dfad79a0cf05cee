#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::Path;

#[derive(Debug)]
enum Error {
    Io(std::io::Error, std::path::PathBuf),
    Decode(vcpu16::DecodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "reading program file \"{}\" failed: {}", path.display(), err),
            Error::Decode(err) => write!(f, "disassembly failed: {}", err),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("PROGRAM")
                .help("Sets the binary program file to disassemble")
                .required(true)
                .index(1),
        )
        .get_matches();

    let program = matches.value_of("PROGRAM").unwrap();
    if let Err(err) = run(program) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run(program: &str) -> Result<(), Error> {
    let path = Path::new(program);
    let image = vrom16::read_file(path).map_err(|err| Error::Io(err, path.to_owned()))?;
    let lines = vdis16::disassemble(image.words()).map_err(Error::Decode)?;
    print!("{}", vdis16::format_lines(&lines));
    Ok(())
}
