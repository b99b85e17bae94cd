//! MPQSigner command-line tool
//!
//! Packs a file into an MPQ archive and signs it, or verifies and signs an
//! existing `.mpq` archive in place.

use anyhow::Context;
use clap::Parser;
use mpq_signer::pipeline::ConsoleSink;
use mpq_signer::{NativeEngine, Pipeline, SignerConfig, BANNER};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mpqsigner", version)]
#[command(about = "Package a file into an MPQ archive and sign it with a weak digital signature")]
struct Args {
    /// File to package, or an existing .mpq archive to sign
    #[arg(required_unless_present = "about")]
    file: Option<PathBuf>,

    /// Print version and attribution, then exit
    #[arg(long)]
    about: bool,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("{}", BANNER);
    println!();

    if args.about {
        println!("Archive engine: native MPQ reader/writer");
        println!("Weak signature: RSA-512 over MD5, using the publicly known weak key");
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => SignerConfig::load(path)?,
        None => SignerConfig::default(),
    };

    let keys = config
        .load_strong_keys()
        .context("Could not load strong signature keys")?;
    let engine = NativeEngine::new().with_strong_keys(keys);
    let pipeline = Pipeline::new(engine, config.pipeline_options());

    let Some(target) = args.file.as_deref() else {
        anyhow::bail!("No input file given");
    };

    let outcome = pipeline.run(target, &mut ConsoleSink)?;
    info!(
        "{} signed ({:?}, signed now: {})",
        outcome.container.display(),
        outcome.signature,
        outcome.signed_now
    );
    Ok(())
}
