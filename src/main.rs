use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blockrun::cli::commands::{self, RunOptions};

#[derive(Parser)]
#[command(name = "blockrun", about = "blockrun — visual-block test runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute test suite files
    Run {
        /// Input suite files (.yaml/.yml/.json)
        files: Vec<PathBuf>,

        /// Project config file (default: ./blockrun.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Base URL for the HTTP driver
        #[arg(long)]
        base_url: Option<String>,

        /// Driver operation timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write a JSON report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop at the first failing suite file
        #[arg(long)]
        fail_fast: bool,
    },

    /// Validate suite files without executing them
    Validate {
        /// Input suite files (.yaml/.yml/.json)
        files: Vec<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            files,
            config,
            base_url,
            timeout,
            output,
            fail_fast,
        }) => {
            if files.is_empty() {
                eprintln!("error: no input files provided");
                std::process::exit(1);
            }
            match commands::run_run(RunOptions {
                files,
                config,
                base_url,
                timeout_ms: timeout,
                output,
                fail_fast,
            }) {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Validate { files }) => {
            if files.is_empty() {
                eprintln!("error: no input files provided");
                std::process::exit(1);
            }
            match commands::run_validate(&files) {
                Ok(result) => println!("{result}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            // No subcommand — clap will show help via the derive
            Cli::parse_from(["blockrun", "--help"]);
        }
    }
}
