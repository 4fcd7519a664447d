use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pose_coach_core::{AppConfig, ExerciseKind, PoseCoachError, PoseCoachService};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> pose_coach_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.seed)?;

    match cli.command {
        Commands::Exercises => {
            for name in ExerciseKind::ALL.iter().map(|kind| kind.as_str()) {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Frame { uri, exercise } => run_frame(config, &uri, exercise.into()).await,
        Commands::Video { uri, exercise } => run_video(config, &uri, exercise.into()).await,
        Commands::Burst {
            prefix,
            count,
            exercise,
        } => run_burst(config, &prefix, count, exercise.into()).await,
    }
}

fn load_config(path: Option<&PathBuf>, seed: Option<u64>) -> pose_coach_core::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(seed) = seed {
        config.pose.simulation_seed = seed;
    }
    Ok(config)
}

async fn run_frame(
    config: AppConfig,
    uri: &str,
    exercise: ExerciseKind,
) -> pose_coach_core::Result<()> {
    tracing::info!(uri, %exercise, "analysing frame");

    let service = PoseCoachService::new(config, None)?;
    let result = service.analyze_frame(uri, exercise).await?;
    print_json(&result)
}

async fn run_video(
    config: AppConfig,
    uri: &str,
    exercise: ExerciseKind,
) -> pose_coach_core::Result<()> {
    tracing::info!(uri, %exercise, "analysing video");

    let service = PoseCoachService::new(config, None)?;
    let metrics = service.analyze_video(uri, exercise).await;
    print_json(&metrics)
}

async fn run_burst(
    config: AppConfig,
    prefix: &str,
    count: usize,
    exercise: ExerciseKind,
) -> pose_coach_core::Result<()> {
    tracing::info!(prefix, count, %exercise, "submitting frame burst");

    let service = PoseCoachService::new(config, None)?;
    let tickets = (0..count)
        .map(|index| {
            service
                .scheduler()
                .schedule(&format!("{prefix}_{index}"), exercise, 0)
        })
        .collect::<pose_coach_core::Result<Vec<_>>>()?;

    let mut resolved = 0;
    for ticket in tickets {
        if ticket.wait().await?.is_some() {
            resolved += 1;
        }
    }

    tracing::info!(resolved, "burst complete");
    print_json(&service.scheduler_stats())
}

fn print_json<T: serde::Serialize>(value: &T) -> pose_coach_core::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(PoseCoachError::from)?;
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Exercise form analysis from video frames", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields use defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the pose simulation seed.
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a single frame and print the result as JSON.
    Frame {
        /// Frame reference understood by the frame decoder.
        uri: String,
        #[arg(short, long, value_enum, default_value_t = Exercise::General)]
        exercise: Exercise,
    },
    /// Analyse a whole video and print the aggregated metrics.
    Video {
        uri: String,
        #[arg(short, long, value_enum, default_value_t = Exercise::General)]
        exercise: Exercise,
    },
    /// Submit frames back-to-back and report how the scheduler admitted them.
    Burst {
        /// Frames are named `<prefix>_<index>`.
        prefix: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        #[arg(short, long, value_enum, default_value_t = Exercise::General)]
        exercise: Exercise,
    },
    /// List the supported exercise types.
    Exercises,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Exercise {
    Squat,
    Pushup,
    Plank,
    General,
}

impl From<Exercise> for ExerciseKind {
    fn from(value: Exercise) -> Self {
        match value {
            Exercise::Squat => ExerciseKind::Squat,
            Exercise::Pushup => ExerciseKind::Pushup,
            Exercise::Plank => ExerciseKind::Plank,
            Exercise::General => ExerciseKind::General,
        }
    }
}
