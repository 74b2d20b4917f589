//! Thin CLI front-end for `pyhost-core`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pyhost_core::{CapabilitySet, Context, NativeFilesystem};

#[derive(Parser)]
#[command(name = "pyhost", about = "An embeddable, capability-sandboxed Python interpreter.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a `.py` file.
    Run {
        file: PathBuf,
        /// Grant every capability (network, filesystem, boto3, sql) instead of none.
        #[arg(long)]
        unrestricted: bool,
    },
    /// Run a source string passed on the command line.
    #[command(name = "eval")]
    Eval {
        #[arg(short = 'c', long = "command")]
        source: String,
        #[arg(long)]
        unrestricted: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let (source, unrestricted) = match cli.command {
        Command::Run { file, unrestricted } => match std::fs::read_to_string(&file) {
            Ok(text) => (text, unrestricted),
            Err(err) => {
                eprintln!("error reading {}: {err}", file.display());
                return ExitCode::FAILURE;
            }
        },
        Command::Eval { source, unrestricted } => (source, unrestricted),
    };

    let capabilities = if unrestricted { CapabilitySet::unrestricted() } else { CapabilitySet::none() };
    tracing::debug!(unrestricted, bytes = source.len(), "starting run");
    let ctx = Context::builder().capabilities(capabilities).filesystem(Arc::new(NativeFilesystem::new(std::env::current_dir().unwrap_or_default()))).build();

    match pyhost_core::run_source(&source, ctx.clone()) {
        Ok(_) => {
            print!("{}", ctx.take_stdout());
            ExitCode::SUCCESS
        }
        Err(err) => {
            print!("{}", ctx.take_stdout());
            tracing::warn!(%err, "run failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
