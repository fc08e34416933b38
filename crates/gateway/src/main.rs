use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cb_domain::config::{Config, ConfigSeverity};
use cb_gateway::api;
use cb_gateway::cli::{Cli, Command, ConfigCommand};
use cb_gateway::rtc::LoopbackTransport;
use cb_gateway::state::{AppState, EnergyVadFactory};
use cb_providers::{DeepgramRecognizer, OpenAiChatProvider, OpenAiSpeechProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cb_gateway::cli::load_config(cli.config.as_ref())?;

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == ConfigSeverity::Error)
            {
                std::process::exit(1);
            }
            println!("config ok");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("chatterbox {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cb_gateway=debug,cb_pipeline=debug")),
        )
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("chatterbox starting");

    // ── Config validation (missing API keys abort startup) ───────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Provider clients (stateless, shared across sessions) ─────────
    let llm = Arc::new(
        OpenAiChatProvider::from_config(&config.llm).context("initializing LLM provider")?,
    );
    tracing::info!(model = %config.llm.model, "llm provider ready");

    let tts = Arc::new(
        OpenAiSpeechProvider::from_config(&config.tts).context("initializing TTS provider")?,
    );
    tracing::info!(voice = %config.tts.voice, "tts provider ready");

    let stt = Arc::new(
        DeepgramRecognizer::from_config(&config.stt).context("initializing STT provider")?,
    );
    tracing::info!(model = %config.stt.model, "stt provider ready");

    // ── Storage dirs ─────────────────────────────────────────────────
    if let Some(parent) = config.storage.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }
    }

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        llm,
        tts,
        stt,
        vad_models: Arc::new(EnergyVadFactory),
        transport: Arc::new(LoopbackTransport::new()),
    };

    // ── Bind ─────────────────────────────────────────────────────────
    // permissive CORS: the reference client may be served from anywhere
    let app = api::router(state.clone())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower::limit::ConcurrencyLimitLayer::new(64))
        .with_state(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "chatterbox listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
