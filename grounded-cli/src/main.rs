use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use grounded_core::config::Config;
use grounded_core::corpus::Corpus;
use grounded_core::pipeline::{QueryOutcome, QueryPipeline};
use grounded_core::provider::OllamaProvider;
use grounded_core::rag::indexer;
use grounded_core::server::{Response, Server};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grounded")]
#[command(about = "Answer questions from your own documents, with a grounding check", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log pipeline transitions and provider calls.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(short, long, help = "Overwrite an existing file")]
        force: bool,
    },

    #[command(about = "Chunk, embed and save a folder of documents")]
    Index {
        #[arg(help = "Folder with the documents to index")]
        dir: PathBuf,
    },

    #[command(about = "Answer a single question against the saved index")]
    Ask {
        question: String,

        #[arg(long, help = "Print the service response as JSON")]
        json: bool,
    },

    #[command(about = "Serve questions on the configured Unix socket")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Show => show_config(&cli.config),
        Commands::Init { force } => init_config(&cli.config, force),
        Commands::Index { dir } => index(&cli.config, &dir).await,
        Commands::Ask { question, json } => ask(&cli.config, &question, json).await,
        Commands::Serve => serve(&cli.config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "grounded_core=debug"
    } else {
        "grounded_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the config file, or the defaults when it does not exist.
fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        tracing::info!(path = %config_path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    Config::load(config_path).context("Failed to load config")
}

fn show_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:           {}", config.llm.model.cyan());
    println!("  Base URL:        {}", config.llm.base_url);
    println!("  Temperature:     {}", config.llm.temperature);
    println!("  Max Tokens:      {}", config.llm.max_tokens);
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Model:           {}", config.embedding.model.cyan());
    println!("  Base URL:        {}", config.embedding_base_url());
    println!("  Batch Size:      {}", config.embedding.batch_size);
    println!();
    println!("{}", "Retrieval:".bold());
    println!("  Top K:           {}", config.retrieval.top_k);
    println!("  Context Budget:  {} chars", config.retrieval.max_context_length);
    println!();
    println!("{}", "Validation:".bold());
    println!("  Threshold:       {}", config.validation.similarity_threshold);
    println!("  Max Answer:      {} chars", config.validation.max_answer_chars);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Index:           {}", config.storage.index_dir.display());
    println!("  Socket:          {}", config.server.socket_path.display());

    Ok(())
}

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let content =
        serde_yaml::to_string(&Config::default()).context("Failed to serialize config")?;
    std::fs::write(config_path, content).context("Failed to write config file")?;

    println!(
        "{} Wrote default configuration to {}",
        "✓".green().bold(),
        config_path.display().to_string().cyan()
    );
    Ok(())
}

async fn index(config_path: &Path, dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let provider = OllamaProvider::new(&config).context("Failed to create provider")?;

    println!("{} Indexing {}...", "→".blue(), dir.display());

    let stats = indexer::index_directory(&provider, dir, &config)
        .await
        .context("Failed to index documents")?;

    println!(
        "{} Indexed {} chunks from {} documents ({} dimensions) into {}",
        "✓".green().bold(),
        stats.chunks.to_string().bold(),
        stats.documents,
        stats.dimension,
        config.storage.index_dir.display()
    );
    Ok(())
}

async fn ask(config_path: &Path, question: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = Corpus::load(&config.storage.index_dir).with_context(|| {
        format!(
            "Failed to load index from {} (run `grounded index <dir>` first)",
            config.storage.index_dir.display()
        )
    })?;
    corpus
        .ensure_model(&config.embedding.model)
        .context("Index was built with a different embedding model")?;

    let pipeline = QueryPipeline::from_config(&config).context("Failed to create provider")?;
    let outcome = pipeline.run(&corpus, question).await;

    if json {
        let failed = !matches!(outcome, QueryOutcome::Completed { .. });
        let response = Response::from(outcome);
        println!("{}", serde_json::to_string_pretty(&response)?);
        if failed {
            anyhow::bail!("question was not answered");
        }
        return Ok(());
    }

    match outcome {
        QueryOutcome::Completed {
            answer, retrieval, ..
        } => {
            println!("{}", answer.text);
            println!();
            println!(
                "{} similarity {:.3}",
                "Sources:".bold(),
                answer.average_similarity
            );
            for hit in retrieval.hits.iter().filter(|h| answer.used_chunk_ids.contains(&h.chunk.id)) {
                println!(
                    "  {} {} (distance {:.4})",
                    "•".cyan(),
                    hit.chunk.source(),
                    hit.distance
                );
            }
            Ok(())
        }
        QueryOutcome::Rejected {
            draft, validation, ..
        } => {
            println!("{}", "Answer withheld: not grounded in the indexed documents.".yellow().bold());
            println!("  {}", validation.reason);
            for (chunk_id, similarity) in draft.used_chunk_ids.iter().zip(&validation.similarities) {
                println!("  {} chunk {chunk_id}: {similarity:.3}", "•".yellow());
            }
            anyhow::bail!("answer rejected by validation")
        }
        QueryOutcome::Failed { state, error, .. } => {
            Err(error).with_context(|| format!("Question failed while {state}"))
        }
    }
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let server = Server::from_config(&config).context("Failed to start server")?;

    println!(
        "{} Listening on {}",
        "✓".green().bold(),
        config.server.socket_path.display().to_string().cyan()
    );
    server.start().await.context("Server error")?;
    println!("\nShutting down...");
    Ok(())
}
