mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crucible-cli")]
#[command(about = "Crucible CLI - Manage execution languages and images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a language to the execution configuration
    AddLang {
        /// Language name (javascript, python, java)
        #[arg(short, long)]
        name: String,

        /// Execution image (defaults to crucible-<name>:latest)
        #[arg(short, long)]
        image: Option<String>,

        /// Memory limit in MB
        #[arg(short, long, default_value = "256")]
        memory: u32,

        /// CPU limit as a fraction of one core
        #[arg(long, default_value = "0.5")]
        cpu: f64,

        /// Process-count ceiling inside the container
        #[arg(long, default_value = "64")]
        pids: i64,

        /// Write a Dockerfile for the execution image
        #[arg(long, default_value = "true")]
        dockerfile: bool,
    },

    /// Remove a language from the execution configuration
    RemoveLang {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// List configured languages
    ListLangs,

    /// Initialize a Crucible deployment directory
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AddLang {
            name,
            image,
            memory,
            cpu,
            pids,
            dockerfile,
        } => {
            commands::add_language(&name, image.as_deref(), memory, cpu, pids, dockerfile).await?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&name, yes).await?;
        }
        Commands::ListLangs => {
            commands::list_languages().await?;
        }
        Commands::Init { path } => {
            commands::init_project(&path).await?;
        }
    }

    Ok(())
}
