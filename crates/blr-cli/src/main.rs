use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "blr")]
#[command(about = "Binlog normalizer and change-stream reconciler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a binlog text dump from stdin into JSON lines on stdout
    Normalize {
        /// Binlog file the dump was rendered from (basename is stamped on every event)
        binlog_file: String,
    },

    /// Reconcile normalized binlog events against change-stream records
    Reconcile {
        /// Normalized binlog events, one JSON object per line
        binlog_json: PathBuf,

        /// Change-stream records, one JSON object per line
        source_json: PathBuf,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Fail on config keys nothing reads instead of warning
        #[arg(long, default_value_t = false)]
        strict_config: bool,

        /// Also write the full report as pretty JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    // Usage errors exit 1; --help / --version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match cli.cmd {
        Commands::Normalize { binlog_file } => commands::normalize::run(&binlog_file)?,

        Commands::Reconcile {
            binlog_json,
            source_json,
            config_paths,
            strict_config,
            report_json,
        } => commands::reconcile::run(commands::reconcile::ReconcileArgs {
            binlog_json,
            source_json,
            config_paths,
            strict_config,
            report_json,
        })?,

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}
