use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use navrank::cli::formatters::{self, HistorySummary};
use navrank::cli::{Cli, Commands};
use navrank::config::Config;
use navrank::pipeline::{run_pipeline, PipelineEvent, PipelineOptions};
use navrank::provider::{MfApiProvider, NavProvider};
use navrank::reports::save_report;
use navrank::returns::compute_trailing_xirr;
use navrank::store::{NavStore, SchemeId};
use navrank::sync::{SyncStatus, Synchronizer};
use navrank::utils::parse_flexible_date;

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries tables and JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.persistence.data_dir = Some(dir.clone());
    }
    if let Commands::Run { limit: Some(n), .. } = &cli.command {
        config.ranking.scheme_limit = Some(*n);
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run { as_of, save, .. } => {
            let as_of = as_of.as_deref().map(parse_flexible_date).transpose()?;
            handle_run(&config, as_of, save, cli.json)
        }
        Commands::Sync { scheme } => handle_sync(&config, &SchemeId::new(scheme), cli.json),
        Commands::Xirr { scheme, as_of } => {
            let as_of = as_of.as_deref().map(parse_flexible_date).transpose()?;
            handle_xirr(&config, &SchemeId::new(scheme), as_of, cli.json)
        }
        Commands::History { scheme } => handle_history(&config, &SchemeId::new(scheme), cli.json),
        Commands::Latest { scheme } => handle_latest(&config, &SchemeId::new(scheme), cli.json),
    }
}

fn open_store(config: &Config) -> Result<NavStore> {
    NavStore::open(config.data_dir()?, config.persistence.shard_count)
}

fn build_provider(config: &Config) -> Result<MfApiProvider> {
    MfApiProvider::new(
        &config.api.base_url,
        config.api_timeout(),
        config.api.page_size,
        config.api.max_retries,
    )
}

fn progress_bar(json: bool) -> ProgressBar {
    if json || !std::io::stderr().is_terminal() {
        return ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

fn handle_run(
    config: &Config,
    as_of: Option<chrono::NaiveDate>,
    save: bool,
    json: bool,
) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let provider: Arc<dyn NavProvider> = Arc::new(build_provider(config)?);
    let today = Local::now().date_naive();
    let options = PipelineOptions {
        as_of,
        ..PipelineOptions::from_config(config, today)
    };

    let bar = progress_bar(json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    // The blocking HTTP client panics if its last handle drops inside the
    // runtime; this handle outlives block_on
    let summary = runtime.block_on(run_pipeline(store, provider.clone(), &options, |event| {
        match event {
            PipelineEvent::SchemesListed { total, .. } => bar.set_length(*total as u64),
            PipelineEvent::SchemeDone {
                scheme_id, status, ..
            } => {
                bar.inc(1);
                if *status == SyncStatus::FetchFailed {
                    bar.set_message(format!("{} failed", scheme_id));
                }
            }
        }
    }))?;
    bar.finish_and_clear();
    drop(provider);

    if json {
        println!("{}", formatters::format_json(&summary));
    } else {
        print!("{}", formatters::format_run_table(&summary));
    }

    if save {
        let path = save_report(&config.reports_dir()?, &summary)?;
        if !json {
            println!("Report saved to {}", path.display());
        }
    }
    Ok(())
}

fn handle_sync(config: &Config, scheme_id: &SchemeId, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let provider = build_provider(config)?;
    let outcome = Synchronizer::new(&store, &provider, config.sync.staleness_days)
        .sync(scheme_id, Local::now().date_naive());

    if json {
        println!("{}", formatters::format_json(&outcome));
    } else {
        print!("{}", formatters::format_sync_outcome(&outcome));
    }
    Ok(())
}

fn handle_xirr(
    config: &Config,
    scheme_id: &SchemeId,
    as_of: Option<chrono::NaiveDate>,
    json: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let series = store.try_load(scheme_id)?;
    let result = compute_trailing_xirr(&series, as_of, &config.return_config())
        .with_context(|| format!("Cannot compute XIRR for scheme {}", scheme_id))?;
    info!("Scheme {} XIRR {} as of {}", scheme_id, result.rate, result.as_of);

    if json {
        println!("{}", formatters::format_json(&result));
    } else {
        print!("{}", formatters::format_xirr(&result));
    }
    Ok(())
}

fn handle_history(config: &Config, scheme_id: &SchemeId, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let series = store.try_load(scheme_id)?;
    let meta = store.load_meta(scheme_id);
    let summary = HistorySummary::new(&series, meta.as_ref());

    if json {
        println!("{}", formatters::format_json(&summary));
    } else {
        print!("{}", formatters::format_history(&summary));
    }
    Ok(())
}

fn handle_latest(config: &Config, scheme_id: &SchemeId, json: bool) -> Result<()> {
    let provider = build_provider(config)?;
    let history = provider
        .fetch_latest(scheme_id)
        .with_context(|| format!("Failed to fetch latest NAV for scheme {}", scheme_id))?;

    if json {
        println!("{}", formatters::format_json(&history));
    } else {
        print!("{}", formatters::format_latest(scheme_id.as_str(), &history));
    }
    Ok(())
}
