#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use feedback360::generator::{NarrativeGenerator, RetryingGenerator};
use feedback360::model::{GroupId, ParticipantId};
use feedback360::narrative::{NarrativeConfig, NarrativeSynthesizer};
use feedback360::render::render_markdown;
use feedback360::service::FeedbackService;
use feedback360::store::{RetryingStore, SqliteStore, SurveyStore};

#[derive(Parser)]
#[command(name = "feedback360", version, about = "360-degree feedback scoring and reports")]
struct Cli {
    /// SQLite database (defaults to FEEDBACK360_DB, then ./feedback360.sqlite)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a participant's scorecard as JSON
    Score {
        #[arg(long)]
        participant: ParticipantId,
    },
    /// Print the competency order shown on a participant's forms
    Order {
        #[arg(long)]
        participant: ParticipantId,
    },
    /// Build a participant's report
    Report {
        #[arg(long)]
        participant: ParticipantId,
        #[arg(long, value_enum, default_value_t = Format::Md)]
        format: Format,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Scores only; do not call the narrative generator
        #[arg(long)]
        skip_narrative: bool,
        /// Override FEEDBACK360_MODEL
        #[arg(long)]
        model: Option<String>,
    },
    /// Print response tracking for a group as JSON
    Tracking {
        #[arg(long)]
        group: GroupId,
        /// Unix time to evaluate overdue status at (defaults to now)
        #[arg(long)]
        now: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Md,
    Json,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<dyn SurveyStore>, Box<dyn std::error::Error>> {
    let path = db.unwrap_or_else(SqliteStore::default_path);
    let store = SqliteStore::new(path)?;
    Ok(Arc::new(RetryingStore::new(store)))
}

fn narrative_synthesizer(
    model: Option<String>,
) -> Result<NarrativeSynthesizer, Box<dyn std::error::Error>> {
    let generator: Arc<dyn NarrativeGenerator> = Arc::new(RetryingGenerator::from_env()?);
    let mut config = NarrativeConfig::from_env();
    if let Some(model) = model {
        config.model = model;
    }
    Ok(NarrativeSynthesizer::new(generator, config))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db)?;

    match cli.command {
        Commands::Score { participant } => {
            let service = FeedbackService::new(store, None);
            let (_, scorecard) = service.score(participant).await?;
            print_json(&scorecard)?;
        }
        Commands::Order { participant } => {
            let service = FeedbackService::new(store, None);
            for (idx, c) in service.form(participant).await?.iter().enumerate() {
                println!("{}\t{}\t{}\t{}", idx + 1, c.id, c.category_name, c.self_text);
            }
        }
        Commands::Report {
            participant,
            format,
            out,
            skip_narrative,
            model,
        } => {
            let report = if skip_narrative {
                FeedbackService::new(store, None)
                    .scoring_only_report(participant)
                    .await?
            } else {
                let service = FeedbackService::new(store, Some(narrative_synthesizer(model)?));
                let draft = service.draft_report(participant).await?;
                if let Some(err) = &draft.narrative_error {
                    warn!(participant, "report written without narrative: {err}");
                }
                draft.report()
            };
            let rendered = match format {
                Format::Md => render_markdown(&report),
                Format::Json => serde_json::to_string_pretty(&report)?,
            };
            match out {
                Some(path) => {
                    fs::write(&path, rendered)?;
                    eprintln!("[report] written to {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Tracking { group, now } => {
            let now = now.unwrap_or_else(|| chrono::Utc::now().timestamp());
            let service = FeedbackService::new(store, None);
            print_json(&service.group_tracking(group, now).await?)?;
        }
    }

    Ok(())
}
