use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;

use mealsnap::{AppState, MealFlow, MealType};

#[derive(Parser)]
#[command(name = "mealsnap", about = "Estimate nutrition from a meal photo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a meal photo and store the result in the local history
    Analyze {
        /// Path to the photo (JPEG or PNG)
        image: PathBuf,
        /// Tag the record with a meal type
        #[arg(long, value_enum)]
        meal_type: Option<MealType>,
        /// Print the analysis without saving it
        #[arg(long)]
        no_save: bool,
    },
    /// List stored meals, most recent first
    History,
    /// Delete all stored meals
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "mealsnap=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let state = AppState::init()?;

    match cli.command {
        Command::Analyze {
            image,
            meal_type,
            no_save,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("read image {}", image.display()))?;

            let mut flow = MealFlow::new();
            flow.begin_capture()?;
            flow.captured(Bytes::from(bytes))?;
            let result = flow.analyze(state.model.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if !no_save {
                let record = flow.save(&state.history, meal_type).await?;
                tracing::info!(id = %record.id, "saved to history");
            }
        }
        Command::History => {
            let records = state.history.load_all().await;
            if records.is_empty() {
                println!("no meals recorded");
            }
            for r in records {
                let when = r
                    .timestamp()
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| r.timestamp_ms.to_string());
                let tag = r
                    .meal_type
                    .map(|t| format!(" [{t}]"))
                    .unwrap_or_default();
                println!(
                    "{}  {}{}  {} kcal  rating {}/10  ({})",
                    when, r.result.food_name, tag, r.result.calories, r.result.rating, r.id
                );
            }
        }
        Command::Clear => {
            state.history.clear().await?;
            println!("history cleared");
        }
    }

    Ok(())
}
