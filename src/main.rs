//! Console demo of detached operations
//!
//! Mounts a refresh page fed by a flaky remote feed, loads the country list in
//! the background, then renders the page periodically until the configured run
//! time is over. Run with `--unguarded` to watch the first failed refresh take
//! the whole session down instead of being shown on the page.

use anyhow::Context;
use clap::Parser;
use detached_ops::config::DemoConfig;
use detached_ops::error::LoadError;
use detached_ops::refresh::{DisplaySnapshot, RefreshController, RefreshSettings};
use detached_ops::services::countries::CountryService;
use detached_ops::services::feed::FlakyFeed;
use detached_ops::status::AsyncOpStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};


#[derive(Parser, Debug)]
#[command(name = "detached-demo")]
#[command(about = "Fire-and-forget operations that do not lose their failures")]
struct Args {
    /// TOML config file, overrides DETACHED_DEMO_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not attach refreshes to a failure continuation
    #[arg(long)]
    unguarded: bool,
}


fn init_tracing() {
    // Logs go to stderr, the page is rendered on stdout
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}


fn render(snapshot: &DisplaySnapshot) {
    let last_error = snapshot.last_error.as_deref().unwrap_or("none");
    println!(
        "[{:>4}] {:?}{} | data: {} | last error: {}",
        snapshot.render,
        snapshot.state,
        if snapshot.can_start() { " (start enabled)" } else { "" },
        if snapshot.message.is_empty() { "-" } else { snapshot.message.as_str() },
        last_error
    );
}


fn describe_load(status: &AsyncOpStatus<LoadError>) -> String {
    match status {
        AsyncOpStatus::Done => "loaded".to_owned(),
        AsyncOpStatus::Error(err) => match err.custom() {
            Some(LoadError::InjectedFault { loaded }) => {
                format!("load failed after {loaded} entries")
            }
            None => format!("load failed: {err}"),
        },
        AsyncOpStatus::Cancelled => "load abandoned".to_owned(),
        AsyncOpStatus::Pending | AsyncOpStatus::Running => "loading".to_owned(),
    }
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let mut config = DemoConfig::load(args.config.as_deref())
        .inspect_err(|err| {
            if let Some(path) = err.path() {
                error!(path = %path.display(), "config file rejected");
            }
        })
        .context("failed to load demo config")?;
    if args.unguarded {
        config.guarded = false;
    }
    info!(?config, "starting demo");

    // The country list starts loading right away, nobody awaits it yet
    let countries = CountryService::new();

    let feed = Arc::new(FlakyFeed::new(config.fetch_delay(),
                                       config.fetch_failure_rate));
    let (dispatcher, mut display) =
        RefreshController::mount(feed.clone(), RefreshSettings::from(&config));
    let ui = dispatcher.handle();
    let mut session = tokio::spawn(dispatcher.run());
    ui.invoke(|page| page.start())
        .await
        .context("refresh page is gone before starting")?;

    let names = countries.get_data().await;
    println!("countries: {} ({})",
             names.join(", "),
             describe_load(&countries.load_status()));

    let deadline = tokio::time::sleep(config.run_for());
    tokio::pin!(deadline);
    let mut ticks = tokio::time::interval(config.render_interval());
    let ended_early = loop {
        tokio::select! {
            _ = &mut deadline => break None,
            joined = &mut session => break Some(joined),
            _ = ticks.tick() => {
                if display.has_update() {
                    render(display.latest());
                }
            }
        }
    };

    let joined = match ended_early {
        Some(joined) => joined,
        None => {
            // The session may have ended meanwhile, in which case this fails
            let _ = ui.invoke(|page| page.dispose()).await;
            ui.shutdown();
            session.await
        }
    };
    match joined.context("dispatcher task failed")? {
        Ok(page) => {
            render(&page.snapshot());
            info!(fetches = feed.fetches(), renders = page.render_requests(),
                  "demo finished");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, fetches = feed.fetches(), "session crashed");
            Err(err.into())
        }
    }
}
