use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::TableSource;

#[derive(Parser, Debug)]
#[command(name = "tablestore")]
#[command(about = "tablestore CLI - inspect and migrate table set storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the stored table set as JSON
    Dump {
        /// Storage config file (TOML)
        #[arg(short, long, env = "TABLESTORE_CONFIG")]
        config: PathBuf,

        /// Only dump this table
        #[arg(short, long)]
        table: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Replace the stored table set from a JSON file
    Load {
        /// Storage config file (TOML)
        #[arg(short, long, env = "TABLESTORE_CONFIG")]
        config: PathBuf,

        /// JSON input file (reads stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Keep stored tables that are not in the input
        #[arg(long)]
        merge: bool,
    },

    /// List tables with row counts
    Tables {
        /// Storage config file (TOML)
        #[arg(short, long, env = "TABLESTORE_CONFIG")]
        config: PathBuf,
    },

    /// Copy the full table set from one back-end to another
    Migrate {
        /// Source storage config file
        #[arg(long)]
        from: PathBuf,

        /// Target storage config file
        #[arg(long)]
        to: PathBuf,

        /// Read the source only
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            config,
            table,
            output,
            compact,
        } => {
            commands::run_dump(&config, table.as_deref(), output, compact).await?;
        }
        Commands::Load {
            config,
            input,
            merge,
        } => {
            let source = match input {
                Some(path) => TableSource::FromFile(path),
                None => TableSource::FromStdin,
            };
            commands::run_load(&config, source, merge).await?;
        }
        Commands::Tables { config } => {
            commands::run_tables(&config).await?;
        }
        Commands::Migrate { from, to, dry_run } => {
            tracing::info!("Migrating {} -> {}", from.display(), to.display());
            commands::run_migrate(&from, &to, dry_run).await?;
        }
    }

    Ok(())
}
