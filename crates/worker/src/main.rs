use anyhow::Context;
use clap::Parser;
use nearhigh_core::domain::country::{CountryTable, Threshold};
use nearhigh_core::ingest::yahoo::YahooChart;
use nearhigh_core::screen::{run_screen, ScreenOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod update;

#[derive(Debug, Parser)]
#[command(name = "nearhigh_worker")]
struct Args {
    /// Country code to update (us, jp, hk, kr).
    country: Option<String>,

    /// Override the fraction of the 52-week high a price must reach (0 < t <= 1).
    #[arg(long)]
    threshold: Option<f64>,

    /// Override how many of the largest listings are screened; 0 screens all.
    #[arg(long)]
    top_n: Option<usize>,

    /// Directory holding `<code>_stocks.json`. Defaults to DATA_DIR or `.`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Back up the previous snapshot and flag tickers that were not in it.
    #[arg(long)]
    mark_new: bool,

    /// Run the screen but do not write any file.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = nearhigh_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let table = CountryTable::from_env();

    let country = match update::select_country(&table, args.country.as_deref()) {
        Ok(country) => country,
        Err(message) => {
            eprint!("{message}");
            return Ok(());
        }
    };

    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }

    let mut opts = ScreenOptions::for_country(country);
    opts.req_delay = settings.quote_req_delay;
    opts.progress_every = settings.progress_every;
    if let Some(t) = args.threshold {
        opts.threshold = Threshold::new(t).context("invalid --threshold")?;
    }
    if let Some(n) = args.top_n {
        opts.top_n = (n != 0).then_some(n);
    }

    tracing::info!(
        country = %country.code,
        threshold = %opts.threshold,
        top_n = ?opts.top_n,
        data_dir = %settings.data_dir.display(),
        dry_run = args.dry_run,
        "update started"
    );

    let listing = nearhigh_core::ingest::listing_provider_for(country, &settings)?;
    let quotes = YahooChart::from_settings(&settings)?;

    let report = run_screen(country, listing.as_ref(), &quotes, &opts).await;

    tracing::info!(
        country = %country.code,
        listed = report.listed,
        candidates = report.candidates,
        kept = report.kept(),
        below_threshold = report.below_threshold,
        skipped = ?report.skipped,
        "screen finished"
    );

    if let Some(err) = &report.listing_error {
        tracing::error!(
            country = %country.code,
            error = %err,
            "listing unavailable; snapshot will be empty"
        );
    }

    if args.dry_run {
        tracing::info!(country = %country.code, dry_run = true, "skipping write");
        return Ok(());
    }

    match update::persist(&settings.data_dir, &country.code, report.records, args.mark_new) {
        Ok(out) => {
            tracing::info!(
                country = %country.code,
                path = %out.path.display(),
                written = out.written,
                new = ?out.new_count,
                "snapshot written"
            );
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(country = %country.code, error = %err, "snapshot write failed");
            Err(err)
        }
    }
}

fn init_sentry(settings: &nearhigh_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
