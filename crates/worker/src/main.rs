use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Market-wide buy/sell call from the news file.
    Single,
    /// One recommendation per portfolio file.
    PerUser,
    /// One recommendation per position, grouped by portfolio file.
    PerStock,
    /// Same as per-stock, keyed by investor.
    All,
}

#[derive(Debug, Parser)]
#[command(name = "advisor_worker")]
struct Args {
    /// Which recommendation run to perform.
    #[arg(long, value_enum, default_value_t = Mode::PerUser)]
    mode: Mode,

    /// Directory of spreadsheet files. Defaults to DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = advisor_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }

    match run(&settings, args.mode, args.pretty).await {
        Ok(json) => {
            println!("{json}");
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(mode = ?args.mode, error = %err, "recommendation run failed");
            Err(err)
        }
    }
}

async fn run(
    settings: &advisor_core::config::Settings,
    mode: Mode,
    pretty: bool,
) -> anyhow::Result<String> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    tracing::info!(
        ?mode,
        data_dir = %orchestrator.data_dir().display(),
        concurrency = settings.llm_concurrency,
        "starting recommendation run"
    );

    let value = match mode {
        Mode::Single => serde_json::to_value(orchestrator.compute_single_action().await?)?,
        Mode::PerUser => serde_json::to_value(orchestrator.compute_per_user().await?)?,
        Mode::PerStock => serde_json::to_value(orchestrator.compute_per_stock().await?)?,
        Mode::All => serde_json::to_value(orchestrator.compute_all_investors_stocks().await?)?,
    };

    let json = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        value.to_string()
    };
    Ok(json)
}

fn init_sentry(settings: &advisor_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
