use clap::{Parser, Subcommand};
use std::path::PathBuf;
use textbook_rag::commands::{ask, ask_selected, configure, ingest, init, status};

#[derive(Parser)]
#[command(name = "textbook-rag")]
#[command(about = "Retrieval-augmented question answering over a Markdown textbook")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file, or show the active one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the passage collection in the vector store
    Init {
        /// Drop and recreate the collection, deleting all indexed passages
        #[arg(long)]
        recreate: bool,
    },
    /// Chunk, embed, and index chapter files
    Ingest {
        /// A Markdown file or a directory of .md chapter files
        path: PathBuf,
        /// Override the chapter number instead of deriving it from filenames
        #[arg(long)]
        chapter: Option<u32>,
    },
    /// Ask a question about the indexed textbook
    Ask {
        /// The question to answer
        question: String,
        /// Restrict retrieval to one chapter
        #[arg(long)]
        chapter: Option<u32>,
        /// Restrict retrieval to one section, e.g. "3.2"
        #[arg(long)]
        section: Option<String>,
    },
    /// Ask a question about a selected span of text
    AskSelected {
        /// The question to answer
        question: String,
        /// File containing the selected text
        #[arg(long)]
        file: PathBuf,
    },
    /// Show service health, index size, and recent queries
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            configure(show)?;
        }
        Commands::Init { recreate } => {
            init(recreate)?;
        }
        Commands::Ingest { path, chapter } => {
            ingest(path, chapter)?;
        }
        Commands::Ask {
            question,
            chapter,
            section,
        } => {
            ask(question, chapter, section).await?;
        }
        Commands::AskSelected { question, file } => {
            ask_selected(question, file).await?;
        }
        Commands::Status => {
            status().await?;
        }
    }

    Ok(())
}
