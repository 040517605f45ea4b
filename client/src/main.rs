mod api;
mod render;

use api::{ApiClient, ClientError, media_type_for};
use clap::{Parser, Subcommand};
use render::{render_history, render_session};
use shared::{DetectionSession, SessionError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "krishi-detect", about = "Diagnose crop pests and diseases from leaf photos")]
struct Cli {
    /// Base URL of the detection backend.
    #[arg(long, env = "KRISHI_API_URL", default_value = "http://localhost:8081")]
    server: String,

    /// Seconds to wait for the backend before giving up.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit one or more images for analysis.
    Detect {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Attach the detections to this user's history.
        #[arg(long)]
        user_id: Option<String>,
    },
    /// List past detections for a user, newest first.
    History { user_id: String },
    /// Ask for general advice about a crop problem.
    Advice {
        #[arg(long)]
        crop: String,
        #[arg(long)]
        issue: String,
    },
}

/// Submits one image and moves the session to its terminal state.
async fn submit_image(
    session: &mut DetectionSession,
    api: &ApiClient,
    path: &Path,
    image: Vec<u8>,
    user_id: Option<&str>,
) -> Result<(), SessionError> {
    session.begin_analysis()?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let outcome = api
        .detect(image, file_name, media_type_for(path), user_id)
        .await
        .map_err(|e: ClientError| {
            log::warn!("Detection for {} failed: {}", path.display(), e);
            e.user_message()
        });

    session.finish(outcome)
}

async fn run_detect(api: &ApiClient, images: &[PathBuf], user_id: Option<&str>) -> bool {
    let mut session = DetectionSession::new();
    let mut all_ok = true;

    for path in images {
        let source = path.display().to_string();
        let image = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Cannot read {}: {}", source, e);
                all_ok = false;
                continue;
            }
        };

        eprintln!("Analyzing {}...", source);
        if let Err(e) = submit_image(&mut session, api, path, image, user_id).await {
            log::error!("Session out of sync for {}: {}", source, e);
            session.reset();
            all_ok = false;
            continue;
        }

        print!("{}", render_session(&session, &source));
        if session.error_message().is_some() {
            all_ok = false;
        }
        session.reset();
    }

    all_ok
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));
    let cli = Cli::parse();

    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let api = ApiClient::new(http, &cli.server);

    let ok = match &cli.command {
        Command::Detect { images, user_id } => {
            run_detect(&api, images, user_id.as_deref()).await
        }
        Command::History { user_id } => match api.history(user_id).await {
            Ok(records) => {
                print!("{}", render_history(user_id, &records));
                true
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                false
            }
        },
        Command::Advice { crop, issue } => match api.crop_advice(crop, issue).await {
            Ok(advice) => {
                println!("{}", advice);
                true
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                false
            }
        },
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
