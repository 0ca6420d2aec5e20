pub mod commands;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod pipeline;
pub mod preferences;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::commands::{Cli, Command};
use crate::config::AppConfig;
use crate::embedding::cache::EmbeddingCache;
use crate::embedding::fetcher::{EmbeddingFetcher, RetryPolicy};
use crate::embedding::transport::HttpEmbeddingTransport;
use crate::embedding::user_skills::UserSkillsEmbedder;
use crate::errors::JobAlertResult;
use crate::pipeline::PipelineTrigger;
use crate::preferences::TomlPreferenceStore;

/// Composition root: everything a command needs, built once from config.
pub struct App {
    pub config: AppConfig,
    pub fetcher: Arc<EmbeddingFetcher>,
    pub skills: UserSkillsEmbedder,
    pub trigger: PipelineTrigger,
}

impl App {
    pub fn from_config(config: AppConfig, cancel: watch::Receiver<bool>) -> JobAlertResult<Self> {
        let transport = HttpEmbeddingTransport::new(
            config.embedding.endpoint.clone(),
            Duration::from_secs(config.embedding.request_timeout_secs),
        )?;
        let fetcher = Arc::new(
            EmbeddingFetcher::new(
                Arc::new(transport),
                config.embedding_api_key(),
                config.embedding.model.clone(),
            )
            .with_policy(RetryPolicy::from(&config.embedding.retry))
            .with_cancel(cancel),
        );

        let store = Arc::new(TomlPreferenceStore::new(config.preferences.path.clone()));
        let skills = UserSkillsEmbedder::new(fetcher.clone(), store, Arc::new(EmbeddingCache::new()));

        let trigger = PipelineTrigger::new(
            config.pipeline.url.clone(),
            config.pipeline_secret(),
            Duration::from_secs(config.pipeline.request_timeout_secs),
        )?;

        Ok(Self {
            config,
            fetcher,
            skills,
            trigger,
        })
    }
}

pub async fn run(cli: Cli) -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C aborts any pending retry wait.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let app = match App::from_config(config, cancel_rx) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise clients");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Command::Trigger { json } => commands::trigger_pipeline(&app, *json).await,
        Command::Embed { text } => commands::embed_text(&app, text).await.map(|_| true),
        Command::SkillsEmbedding { user } => {
            commands::skills_embedding(&app, user.as_deref()).await.map(|_| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
