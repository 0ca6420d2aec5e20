use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::errors::JobAlertResult;
use crate::pipeline::run_trigger;
use crate::App;

#[derive(Debug, Parser)]
#[command(name = "jobalert", version, about = "Trigger the job alert pipeline and compute skills embeddings")]
pub struct Cli {
    /// Path to config.toml (defaults to the usual search locations).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scrape, score and notify pipeline once.
    Trigger {
        /// Print the outcome as JSON instead of a sentence.
        #[arg(long)]
        json: bool,
    },
    /// Embed arbitrary text and print the vector as JSON.
    Embed { text: String },
    /// Embed a user's stored skills and print the vector as JSON.
    SkillsEmbedding {
        /// Preference record id (defaults to preferences.default_user).
        #[arg(long)]
        user: Option<String>,
    },
}

/// Returns whether the pipeline run succeeded.
pub async fn trigger_pipeline(app: &App, json: bool) -> JobAlertResult<bool> {
    eprintln!("Running pipeline...");
    let outcome = run_trigger(&app.trigger).await;
    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        println!("{}", outcome.message());
    }
    Ok(outcome.is_success())
}

pub async fn embed_text(app: &App, text: &str) -> JobAlertResult<()> {
    let vector = app.fetcher.fetch_embedding(text).await?;
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}

pub async fn skills_embedding(app: &App, user: Option<&str>) -> JobAlertResult<()> {
    let user_id = user.unwrap_or(&app.config.preferences.default_user);
    let vector = app.skills.get_user_skills_embedding(user_id).await?;
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}
