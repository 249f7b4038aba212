use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use nearhigh_core::domain::country::CountryTable;
use nearhigh_core::domain::stock::StockRecord;
use std::path::PathBuf;
use std::sync::Arc;
use tera::Tera;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod page;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = nearhigh_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let templates = match page::build_templates() {
        Ok(t) => t,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            return Err(e);
        }
    };

    let state = AppState {
        data_dir: Arc::new(settings.data_dir.clone()),
        countries: Arc::new(CountryTable::from_env()),
        templates: Arc::new(templates),
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/stocks/:country_code", get(get_stocks))
        .route("/:country_code", get(country_page))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.require_port()?));

    tracing::info!(%addr, data_dir = %settings.data_dir.display(), "web listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    data_dir: Arc<PathBuf>,
    countries: Arc<CountryTable>,
    templates: Arc<Tera>,
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    render_page(state, None).await
}

async fn country_page(
    State(state): State<AppState>,
    Path(country_code): Path<String>,
) -> Result<Html<String>, StatusCode> {
    render_page(state, Some(country_code)).await
}

async fn get_stocks(
    State(state): State<AppState>,
    Path(country_code): Path<String>,
) -> Result<Json<Vec<StockRecord>>, StatusCode> {
    let page = load_page(&state, Some(country_code)).await?;
    Ok(Json(page.stocks))
}

async fn load_page(
    state: &AppState,
    country_code: Option<String>,
) -> Result<page::PageContext, StatusCode> {
    let data_dir = state.data_dir.clone();
    let countries = state.countries.clone();

    tokio::task::spawn_blocking(move || {
        page::load_page(&data_dir, &countries, country_code.as_deref())
    })
    .await
    .map_err(|e| {
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "page load task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn render_page(
    state: AppState,
    country_code: Option<String>,
) -> Result<Html<String>, StatusCode> {
    let page = load_page(&state, country_code).await?;

    tracing::debug!(
        country = %page.active_country_code,
        stocks = page.stocks.len(),
        last_updated = %page.last_updated,
        "rendering dashboard"
    );

    page::render(&state.templates, &page).map(Html).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "dashboard render failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
