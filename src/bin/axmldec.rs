//! axmldec CLI
//!
//! Decode an AXML file, optionally inside an APK file, and print it as XML.

use anyhow::Result;
use axmldec::{Destination, Encoder, InputSource, Resolver, DEFAULT_ENTRY};
use clap::Parser;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "axmldec")]
#[command(about = "Decodes an AXML file, optionally inside an APK file")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to the input file (default: standard input)
    input: Option<PathBuf>,

    /// Entry name in the input file
    #[arg(default_value = DEFAULT_ENTRY)]
    entry: String,

    /// Path to the output file (default: standard output)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Write the XML declaration before the document
    #[arg(long)]
    declaration: bool,

    /// Print version number
    #[arg(short = 'v', long)]
    version: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help lands here too and is not a failure
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {}", clap_message(&e));
            return ExitCode::FAILURE;
        }
    };

    if cli.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match process_file(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// First line of a clap error without its `error: ` label
fn clap_message(e: &clap::Error) -> String {
    let rendered = e.render().to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}

fn process_file(cli: Cli) -> Result<()> {
    let input = InputSource::from_arg(cli.input);
    let destination = Destination::from_arg(cli.output);
    debug!("decoding {input:?} (entry {}) to {destination:?}", cli.entry);

    let tree = Resolver::new().resolve(&input, &cli.entry)?;
    Encoder::new()
        .with_declaration(cli.declaration)
        .emit(&tree, &destination)?;

    Ok(())
}
