use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use study_scheduler::config::LoggingConfig;
use study_scheduler::{log_system_event, Confidence, Config, Database, ReviewService};

const USAGE: &str = "usage: study-scheduler due <learner-id> [limit]\n       \
                     study-scheduler stats <learner-id>\n       \
                     study-scheduler review <card-id> <correct> <low|medium|high>";

#[derive(Debug, PartialEq)]
enum Command {
    Due { learner_id: String, limit: Option<usize> },
    Stats { learner_id: String },
    Review { card_id: Uuid, correct: bool, confidence: Confidence },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let arg = |index: usize| {
            args.get(index)
                .map(String::as_str)
                .ok_or_else(|| anyhow!(USAGE))
        };

        let command = match arg(0)? {
            "due" => Command::Due {
                learner_id: arg(1)?.to_string(),
                limit: args
                    .get(2)
                    .map(|limit| {
                        limit
                            .parse::<usize>()
                            .map_err(|_| anyhow!("Invalid limit '{}'\n{}", limit, USAGE))
                    })
                    .transpose()?,
            },
            "stats" => Command::Stats {
                learner_id: arg(1)?.to_string(),
            },
            "review" => Command::Review {
                card_id: arg(1)?
                    .parse::<Uuid>()
                    .with_context(|| format!("Invalid card id '{}'", args[1]))?,
                correct: arg(2)?
                    .parse::<bool>()
                    .with_context(|| format!("<correct> must be true or false, got '{}'", args[2]))?,
                confidence: arg(3)?.parse::<Confidence>()?,
            },
            other => return Err(anyhow!("Unknown command '{}'\n{}", other, USAGE)),
        };

        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "cli", "study-scheduler starting");

    let db = Database::with_max_connections(&config.database.url, config.database.max_connections)
        .await?;
    let service = ReviewService::with_config(db, config.scheduler.clone());

    match command {
        Command::Due { learner_id, limit } => {
            let due = match limit {
                Some(limit) => service.due_flashcards(&learner_id, Some(limit)).await?,
                None => service.next_session(&learner_id).await?,
            };
            info!(learner_id = %learner_id, count = due.len(), "Due flashcards selected");
            println!("{}", serde_json::to_string_pretty(&due)?);
        }
        Command::Stats { learner_id } => {
            let snapshot = service.statistics(&learner_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Review {
            card_id,
            correct,
            confidence,
        } => {
            let outcome = service
                .review_with_outcome(card_id, correct, confidence)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    log_system_event!(shutdown, component = "cli", "study-scheduler finished");
    Ok(())
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Log to stderr so JSON on stdout stays machine-readable
    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Daily rotation, no ANSI colors in files
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "study-scheduler.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
