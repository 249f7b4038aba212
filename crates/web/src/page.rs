use anyhow::Context;
use nearhigh_core::domain::country::{CountryEntry, CountryTable};
use nearhigh_core::domain::stock::StockRecord;
use nearhigh_core::storage::snapshot;
use nearhigh_core::time::kst::format_last_updated;
use serde::Serialize;
use std::path::Path;
use tera::Tera;

const INDEX_TEMPLATE: &str = "index.html";

/// Everything the dashboard template renders.
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub stocks: Vec<StockRecord>,
    pub countries: Vec<CountryEntry>,
    pub active_country_code: String,
    pub country_name: String,
    pub last_updated: String,
}

/// Resolves the country (default on unknown) and reads its snapshot.
/// Any read problem yields an empty stock list.
pub fn load_page(data_dir: &Path, table: &CountryTable, code: Option<&str>) -> PageContext {
    let country = table.resolve(code);
    let path = snapshot::snapshot_path(data_dir, &country.code);

    PageContext {
        stocks: snapshot::load_snapshot(&path),
        countries: table.entries(),
        active_country_code: country.code.clone(),
        country_name: country.name.clone(),
        last_updated: format_last_updated(snapshot::last_modified(&path)),
    }
}

pub fn build_templates() -> anyhow::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))
        .context("failed to parse index template")?;
    tera.autoescape_on(vec![".html"]);
    Ok(tera)
}

pub fn render(tera: &Tera, page: &PageContext) -> anyhow::Result<String> {
    let ctx = tera::Context::from_serialize(page).context("failed to build template context")?;
    tera.render(INDEX_TEMPLATE, &ctx)
        .context("failed to render index template")
}
