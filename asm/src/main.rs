#[macro_use]
extern crate clap;

use clap::Arg;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum IoErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Assemble(vasm16::AssembleError),
    Io(std::io::Error, IoErrorContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IoErrorContext::ReadInput => "reading input",
                    IoErrorContext::WriteOutput => "writing output",
                },
                path.display(),
                err
            ),
            Error::Assemble(err) => write!(f, "assembly failed: {}", err),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input assembly file to use")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the output binary file to write to"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Prints the assembled word count on success"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let verbose = matches.is_present("verbose");

    if let Err(err) = vasm(input, output, verbose) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn vasm(input: &str, output: Option<&str>, verbose: bool) -> Result<(), Error> {
    let input_path = Path::new(input);

    let words = vasm16::assemble_file(input_path).map_err(Error::Assemble)?;

    let output_path: PathBuf = output.map(PathBuf::from).unwrap_or_else(|| input_path.with_extension("bin"));

    let image = vrom16::Image::from_words(words).map_err(|err| {
        Error::Io(
            std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()),
            IoErrorContext::WriteOutput,
            output_path.clone(),
        )
    })?;
    vrom16::write_file(&output_path, &image)
        .map_err(|err| Error::Io(err, IoErrorContext::WriteOutput, output_path.clone()))?;

    if verbose {
        println!("wrote {} words to {}", image.len(), output_path.display());
    }
    Ok(())
}
