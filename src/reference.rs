//! Static reference data served alongside search: the supported countries,
//! the registry of integrated sources and which countries each source covers.

use crate::models::{Country, PropertySource};

/// (code, name, flag)
const COUNTRIES: &[(&str, &str, &str)] = &[
    ("DE", "Germany", "🇩🇪"),
    ("ES", "Spain", "🇪🇸"),
    ("IT", "Italy", "🇮🇹"),
    ("PT", "Portugal", "🇵🇹"),
    ("IE", "Ireland", "🇮🇪"),
    ("NO", "Norway", "🇳🇴"),
    ("SE", "Sweden", "🇸🇪"),
    ("BE", "Belgium", "🇧🇪"),
    ("PL", "Poland", "🇵🇱"),
    ("HU", "Hungary", "🇭🇺"),
    ("NL", "Netherlands", "🇳🇱"),
    ("FR", "France", "🇫🇷"),
    ("GR", "Greece", "🇬🇷"),
    ("CZ", "Czech Republic", "🇨🇿"),
    ("CH", "Switzerland", "🇨🇭"),
    ("UK", "United Kingdom", "🇬🇧"),
];

/// Countries covered by each listing site, keyed by source name.
/// Includes sites without an adapter yet.
const SOURCE_COUNTRIES: &[(&str, &[&str])] = &[
    ("ImmoScout24", &["DE"]),
    ("Idealista", &["ES", "IT", "PT"]),
    ("Daft", &["IE"]),
    ("FINN", &["NO"]),
    ("Hemnet", &["SE"]),
    ("Immoweb", &["BE"]),
    ("Otodom", &["PL"]),
    ("Ingatlan", &["HU"]),
];

/// (name, country code, website)
const SOURCES: &[(&str, &str, &str)] = &[
    ("ImmoScout24", "DE", "https://www.immobilienscout24.de"),
    ("Idealista", "ES", "https://www.idealista.com"),
    ("Daft", "IE", "https://www.daft.ie"),
];

/// Look up a supported country by its ISO code (case-insensitive)
pub fn country(code: &str) -> Option<Country> {
    COUNTRIES
        .iter()
        .find(|(c, _, _)| c.eq_ignore_ascii_case(code))
        .map(|(code, name, flag)| Country {
            code: code.to_string(),
            name: name.to_string(),
            flag: Some(flag.to_string()),
        })
}

/// All countries the query surface offers
pub fn countries() -> Vec<Country> {
    COUNTRIES
        .iter()
        .filter_map(|(code, _, _)| country(code))
        .collect()
}

/// Country codes a source publishes listings for
pub fn supported_countries(source_name: &str) -> &'static [&'static str] {
    SOURCE_COUNTRIES
        .iter()
        .find(|(name, _)| *name == source_name)
        .map(|(_, codes)| *codes)
        .unwrap_or(&[])
}

/// Source descriptor for a listing site in the given country
pub fn source(name: &str, country_code: &str, website: &str) -> PropertySource {
    let country = country(country_code).unwrap_or_else(|| Country {
        code: country_code.to_uppercase(),
        name: country_code.to_uppercase(),
        flag: None,
    });

    PropertySource {
        name: name.to_string(),
        country,
        website: website.to_string(),
        logo_url: Some(format!("{}/favicon.ico", website)),
    }
}

/// Registry of the integrated listing sites
pub fn property_sources() -> Vec<PropertySource> {
    SOURCES
        .iter()
        .map(|(name, code, website)| source(name, code, website))
        .collect()
}
