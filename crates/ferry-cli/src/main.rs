#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ferry: export a legacy meeting snapshot as VoteIT 4 fixtures",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit the run summary as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        OutputMode::resolve(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Export a snapshot",
        long_about = "Run the full export and write the record array. Nothing is written when a critical diagnostic was recorded.",
        after_help = "EXAMPLES:\n    # Export to voteit4_export.json\n    ferry export --source snapshot.json\n\n    # Pick the output file and config\n    ferry export --source snapshot.json --output out.json --config ferry.toml\n\n    # Emit a machine-readable summary\n    ferry export --source snapshot.json --json"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        about = "Dry-run an export",
        long_about = "Run the full export and report diagnostics without writing anything.",
        after_help = "EXAMPLES:\n    # Check a snapshot\n    ferry check --source snapshot.json\n\n    # Emit a machine-readable summary\n    ferry check --source snapshot.json --json"
    )]
    Check(cmd::export::CheckArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FERRY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "ferry=debug,info"
        } else {
            "ferry=info,warn"
        })
    });

    let format = env::var("FERRY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!("verbose logging enabled");

    let cwd = env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Export(ref args) => cmd::export::run_export(args, output, &cwd),
        Commands::Check(ref args) => cmd::export::run_check(args, output, &cwd),
    }
}
