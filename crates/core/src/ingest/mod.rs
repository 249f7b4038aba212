pub mod kis;
pub mod nasdaq;
pub mod provider;
pub mod types;
pub mod yahoo;
pub mod yahoo_screener;
pub mod yahoo_session;

use crate::config::Settings;
use crate::domain::country::{CountryConfig, ListingSource};
use anyhow::Result;
use provider::{FileListing, HttpJsonListing, ListingProvider};

/// Picks the listing implementation configured for `country`.
pub fn listing_provider_for(
    country: &CountryConfig,
    settings: &Settings,
) -> Result<Box<dyn ListingProvider>> {
    let provider: Box<dyn ListingProvider> = match &country.listing {
        ListingSource::NasdaqScreener { exchange } => Box::new(
            nasdaq::NasdaqScreener::from_settings(settings, exchange.clone())?,
        ),
        ListingSource::YahooScreener { region } => Box::new(
            yahoo_screener::YahooScreener::from_settings(settings, region.clone())?,
        ),
        ListingSource::KisMaster { markets } => Box::new(kis::KisMasterListing::from_settings(
            settings,
            markets.clone(),
        )?),
        ListingSource::HttpJson { url } => {
            Box::new(HttpJsonListing::from_settings(settings, url.clone())?)
        }
        ListingSource::File { path } => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                settings.data_dir.join(path)
            };
            Box::new(FileListing::new(path))
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::country::CountryTable;

    #[test]
    fn selects_provider_by_listing_source() {
        let settings = Settings::default();
        let table = CountryTable::builtin();

        let names: Vec<&str> = table
            .iter()
            .map(|c| listing_provider_for(c, &settings).unwrap().provider_name())
            .collect();

        assert_eq!(names, vec!["nasdaq_screener", "yahoo_screener", "yahoo_screener", "kis_master"]);
    }

    #[test]
    fn listing_file_override_selects_file_provider() {
        let settings = Settings {
            data_dir: std::path::PathBuf::from("/srv/nearhigh"),
            ..Settings::default()
        };
        let table = CountryTable::from_lookup(|k| {
            (k == "COUNTRY_JP_LISTING_FILE").then(|| "jp_listing.json".to_string())
        });

        let jp = table.get("jp").unwrap();
        let provider = listing_provider_for(jp, &settings).unwrap();
        assert_eq!(provider.provider_name(), "file");
    }
}
