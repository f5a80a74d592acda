//! chatscrape CLI
//!
//! Ask a question against the chat app through a headless browser and print
//! (or save) whatever the model produced.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatscrape::catalog::ModelCatalog;
use chatscrape::extract::{GenerationKind, RequestContext};
use chatscrape::session::{AskOutcome, ChatSession};
use chatscrape::{BrowserManager, load_yaml_config};

#[derive(Parser)]
#[command(name = "chatscrape")]
#[command(about = "Headless-browser client for t3.chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and wait for the answer
    Ask {
        /// The question to ask
        question: String,

        /// Model name (substring match against the catalog)
        #[arg(short, long)]
        model: Option<String>,

        /// Ask the model to use web search (models that support it)
        #[arg(long)]
        search: bool,

        /// Image URL to reference in the prompt
        #[arg(long)]
        image_url: Option<String>,

        /// PDF URL to reference in the prompt
        #[arg(long)]
        pdf_url: Option<String>,

        /// Where to write a generated image (default: answer.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List models from the catalog
    Models {
        /// Filter by provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Launch the browser and load the app, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_yaml_config()?;
    let manager = BrowserManager::global();

    let result = match cli.command {
        Commands::Ask {
            question,
            model,
            search,
            image_url,
            pdf_url,
            output,
        } => {
            run_ask(
                manager.clone(),
                config,
                question,
                model,
                search,
                image_url,
                pdf_url,
                output,
            )
            .await
        }
        Commands::Models { provider } => run_models(&config, provider),
        Commands::Check => {
            let session = ChatSession::new(manager.clone(), config);
            session.test_connection().await?;
            println!("OK: browser launched and app reachable");
            Ok(())
        }
    };

    // Close Chrome before reporting the outcome so a failed run doesn't leave
    // an orphaned process behind.
    if let Err(e) = manager.shutdown().await {
        warn!("Browser shutdown failed: {}", e);
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_ask(
    manager: std::sync::Arc<BrowserManager>,
    config: chatscrape::Config,
    question: String,
    model: Option<String>,
    search: bool,
    image_url: Option<String>,
    pdf_url: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let catalog = ModelCatalog::load(&config.catalog_path)
        .with_context(|| format!("loading model catalog from {}", config.catalog_path))?;

    let wanted = model.as_deref().unwrap_or(&config.default_model);
    let model = catalog
        .find(wanted)
        .ok_or_else(|| anyhow!("No model matching '{}' in {}", wanted, config.catalog_path))?
        .clone();

    let mut context = match model.generation_kind() {
        GenerationKind::Image => RequestContext::image(question),
        GenerationKind::Text => RequestContext::text(question),
    };
    context.search_enabled = search;
    context.image_url = image_url;
    context.document_url = pdf_url;

    let session = ChatSession::new(manager, config);
    match session.ask(&model, &context).await? {
        AskOutcome::Text(text) => {
            println!("{text}");
        }
        AskOutcome::Image(asset) => {
            let path = output.unwrap_or_else(|| PathBuf::from("answer.png"));
            match asset.bytes {
                Some(bytes) => {
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("writing image to {}", path.display()))?;
                    info!("Saved generated image to {}", path.display());
                    println!("{}", path.display());
                }
                None => {
                    // Asset was accepted by URL but never downloaded
                    println!("{}", asset.source_url);
                }
            }
        }
        AskOutcome::Fallback { url } => {
            warn!("Could not extract an answer in time");
            println!("Answer not ready in time. Open it here: {url}");
        }
    }
    Ok(())
}

fn run_models(config: &chatscrape::Config, provider: Option<String>) -> Result<()> {
    let catalog = ModelCatalog::load(&config.catalog_path)
        .with_context(|| format!("loading model catalog from {}", config.catalog_path))?;

    println!("{:<28} {:<12} {:<8} FEATURES", "NAME", "PROVIDER", "TIER");
    println!("{}", "-".repeat(72));
    for model in catalog.models() {
        if let Some(p) = &provider
            && !model.provider.eq_ignore_ascii_case(p)
        {
            continue;
        }
        let mut features = Vec::new();
        let f = &model.features;
        for (on, name) in [
            (f.vision, "vision"),
            (f.reasoning, "reasoning"),
            (f.pdf, "pdf"),
            (f.search, "search"),
            (f.effort_control, "effort control"),
            (f.fast, "fast"),
            (f.image_gen, "imagegen"),
        ] {
            if on {
                features.push(name);
            }
        }
        println!(
            "{:<28} {:<12} {:<8} {}",
            model.name,
            model.provider,
            format!("{:?}", model.tier),
            features.join(", ")
        );
    }
    Ok(())
}
