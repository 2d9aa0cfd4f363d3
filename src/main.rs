use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::{pin_mut, StreamExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quill_core::config::AppConfig;
use quill_core::{QuillError, ResearchEvent};
use quill_graph::ResearchGraph;

#[derive(Parser)]
#[command(name = "quill", version, about = "Deep-research report engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "quill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and print the finished report
    Run {
        /// The research topic
        topic: String,
        /// Number of parallel search queries
        #[arg(short, long, default_value = "3")]
        queries: usize,
    },
    /// Research a topic, streaming progress and report tokens as they arrive
    Stream {
        /// The research topic
        topic: String,
        /// Number of parallel search queries
        #[arg(short, long, default_value = "3")]
        queries: usize,
    },
    /// Start the HTTP/SSE gateway server
    Serve,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quill=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        eprintln!(
            "Warning: config file {} not found, reading keys from environment",
            cli.config.display()
        );
        create_env_config()?
    };

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let graph = build_graph(&config);

    match cli.command {
        Commands::Run { topic, queries } => {
            info!(topic = %topic, queries, "starting buffered research run");
            match graph.run(&topic, queries).await {
                Ok(report) => println!("{report}"),
                Err(QuillError::UnsafeTopic { category }) => {
                    eprintln!("Topic is flagged as unsafe: {category}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Stream { topic, queries } => {
            let events = graph.stream(&topic, queries);
            pin_mut!(events);
            let mut failed = false;
            while let Some(event) = events.next().await {
                match event {
                    ResearchEvent::Progress { content } => eprintln!("[{content}]"),
                    ResearchEvent::Stream { content } => {
                        print!("{content}");
                        io::stdout().flush().ok();
                    }
                    ResearchEvent::End { queries, run_id } => {
                        println!();
                        eprintln!("[done: run {run_id}, queries: {}]", queries.join("; "));
                    }
                    ResearchEvent::Error { content } => {
                        eprintln!("[error: {content}]");
                        failed = true;
                    }
                }
            }
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            let gateway_config = config.gateway.clone().unwrap_or_default();
            info!(bind = %gateway_config.bind, "starting gateway");
            let server = quill_gateway::GatewayServer::new(
                gateway_config,
                config.pipeline.clone(),
                Arc::new(graph),
            );

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Config => unreachable!("handled before graph construction"),
    }

    Ok(())
}

/// Wire the pipeline from config: primary model, summary model, search.
fn build_graph(config: &AppConfig) -> ResearchGraph {
    let chat: Arc<dyn quill_core::ChatModel> =
        Arc::from(quill_llm::create_chat_model(&config.model));
    let summary_chat: Arc<dyn quill_core::ChatModel> =
        Arc::from(quill_llm::create_chat_model(config.summary_model()));
    let search: Arc<dyn quill_core::SearchProvider> =
        Arc::from(quill_llm::create_search_provider(&config.search));
    ResearchGraph::new(config, chat, summary_chat, search)
}

/// Minimal config from environment variables, for running without a file.
fn create_env_config() -> anyhow::Result<AppConfig> {
    let groq_key = std::env::var("GROQ_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let tavily_key = std::env::var("TAVILY_API_KEY")
        .map_err(|_| anyhow::anyhow!("TAVILY_API_KEY is required when no config file exists"))?;

    let (model_id, base_url, api_key) = if let Some(key) = groq_key {
        (
            "llama-3.3-70b-versatile".to_string(),
            Some("https://api.groq.com/openai/v1/chat/completions".to_string()),
            Some(key),
        )
    } else if let Some(key) = openai_key {
        ("gpt-4o-mini".to_string(), None, Some(key))
    } else {
        anyhow::bail!("set GROQ_API_KEY or OPENAI_API_KEY, or create quill.toml");
    };

    let model = quill_core::config::ModelConfig {
        provider: "openai".to_string(),
        model_id,
        api_key,
        base_url,
        ..Default::default()
    };

    Ok(AppConfig {
        model,
        summary_model: None,
        search: quill_core::config::SearchConfig {
            provider: "tavily".to_string(),
            api_key: tavily_key,
            search_depth: "basic".to_string(),
            exclude_domains: vec![],
            max_results: 5,
        },
        pipeline: Default::default(),
        gateway: None,
    })
}
