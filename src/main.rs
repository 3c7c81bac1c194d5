use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

mod cli;
mod config;
mod embedding;
mod graph;
mod hashing;
mod index;
mod indexer;
mod query;

#[derive(Parser)]
#[command(name = "auditgraph")]
#[command(author = "Intent Project Team")]
#[command(version)]
#[command(about = "Cross-file usage graph and incremental semantic function index for codebase audits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the semantic function index
    Index {
        /// Project directory to index
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Re-index on file changes
        #[arg(short, long)]
        watch: bool,

        /// Clear the index and cache before indexing
        #[arg(short, long)]
        rebuild: bool,

        /// Keep vectors in memory instead of the on-disk database
        #[arg(long)]
        memory: bool,
    },

    /// List the files importing an exported symbol
    Usage {
        /// Exported symbol name
        symbol: String,

        /// Project-relative file that defines the symbol
        #[arg(short, long)]
        file: String,

        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: json, text
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List exports that no project file imports
    Unused {
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: json, text
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Find near-duplicates of the functions in a file
    Duplicates {
        /// Project-relative file
        file: String,

        /// Only this function
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: json, text
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show index statistics
    Stats {
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Include usage graph statistics
        #[arg(long)]
        detailed: bool,
    },
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.verbose);

    info!("auditgraph v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index {
            project,
            watch,
            rebuild,
            memory,
        } => {
            info!("Indexing project: {}", project);
            cli::index::index_project(project, watch, rebuild, memory).await?;
        }

        Commands::Usage {
            symbol,
            file,
            project,
            format,
        } => {
            cli::usage::show_usage(symbol, file, project, format).await?;
        }

        Commands::Unused { project, format } => {
            cli::unused::list_unused(project, format).await?;
        }

        Commands::Duplicates {
            file,
            name,
            project,
            format,
        } => {
            cli::duplicates::find_duplicates(file, name, project, format).await?;
        }

        Commands::Stats { project, detailed } => {
            cli::stats::show_stats(project, detailed).await?;
        }
    }

    Ok(())
}
