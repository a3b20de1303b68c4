mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codejudge-cli")]
#[command(about = "codejudge CLI - Evaluate candidate code locally or through the queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a candidate locally and print the JSON report
    Run {
        /// Candidate source file
        #[arg(short, long)]
        code: PathBuf,

        /// Test spec file (Python literal or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Harness template prepended to the candidate
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Per-test timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Include per-test debug records
        #[arg(long, default_value = "false")]
        debug: bool,

        /// Keep running after the first runtime error
        #[arg(long, default_value = "false")]
        no_early_stop: bool,

        /// Harness configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show how each equivalence stage judges two outputs
    Compare {
        #[arg(short, long)]
        actual: String,

        #[arg(short, long)]
        expected: String,

        /// Parse both sides as Python literals instead of raw text
        #[arg(long, default_value = "false")]
        literal: bool,
    },

    /// Queue a candidate for the worker and print the job id
    Submit {
        #[arg(short, long)]
        code: PathBuf,

        #[arg(short, long)]
        spec: PathBuf,

        #[arg(short, long)]
        template: Option<PathBuf>,

        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long, default_value = "false")]
        debug: bool,
    },

    /// Fetch a stored job result
    Result {
        /// Job id returned by `submit`
        #[arg(short, long)]
        id: String,

        /// Keep polling for up to this many seconds
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            code,
            spec,
            template,
            timeout,
            debug,
            no_early_stop,
            config,
        } => {
            commands::init_logging();
            let request = commands::build_request(&code, &spec, template.as_deref(), timeout, debug)?;
            let request = codejudge_harness::HarnessRequest {
                early_stop: no_early_stop.then_some(false),
                ..request
            };
            commands::run_local(&request, config.as_deref()).await?;
        }
        Commands::Compare {
            actual,
            expected,
            literal,
        } => {
            commands::compare(&actual, &expected, literal)?;
        }
        Commands::Submit {
            code,
            spec,
            template,
            timeout,
            debug,
        } => {
            let request = commands::build_request(&code, &spec, template.as_deref(), timeout, debug)?;
            commands::submit(request).await?;
        }
        Commands::Result { id, wait } => {
            commands::fetch_result(&id, wait).await?;
        }
    }

    Ok(())
}
