mod detect;
mod gemini;
mod incident;
mod known;
mod page;
mod supabase;
mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use gemini::GeminiClient;
use known::KnownStore;
use supabase::SupabaseClient;
use watcher::Watcher;

const DEFAULT_URL: &str = "https://www.dgms.gov.in/UserView/index?mid=1362";

#[derive(Parser)]
#[command(
    name = "alert_watcher",
    about = "Watch DGMS safety alerts, extract incident data, upload to Supabase"
)]
struct Cli {
    /// URL of the alerts page to poll
    #[arg(short, long, default_value = DEFAULT_URL)]
    url: String,

    /// Dev page URL, used instead of --url when set
    #[arg(short, long)]
    dev_url: Option<String>,

    /// JSON file storing known alert names
    #[arg(short, long, default_value = "safety_alerts.json")]
    json: PathBuf,

    /// Polling interval in seconds
    #[arg(short, long, default_value = "5")]
    interval: u64,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Collaborators are constructed up front; missing credentials are fatal
    // before the loop starts.
    let extractor = GeminiClient::from_env().context("failed to initialize Gemini client")?;
    let sink = SupabaseClient::from_env().context("failed to initialize Supabase client")?;

    let target = cli.dev_url.unwrap_or(cli.url);
    let watcher = Watcher::new(
        target,
        KnownStore::new(cli.json),
        Duration::from_secs(cli.interval),
        extractor,
        sink,
    );

    tokio::select! {
        result = watcher.run(cli.once) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted by user, exiting");
            Ok(())
        }
    }
}
