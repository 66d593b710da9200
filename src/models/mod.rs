use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Currency used when a source does not report one
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Canonical property category shared by all sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Apartment,
    House,
    Villa,
    Townhouse,
    Studio,
    Commercial,
    Land,
    Other,
}

/// Whether a listing is for sale or for rent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingType {
    ForSale,
    ForRent,
    ShortTermRental,
}

/// Country a source publishes listings for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub flag: Option<String>,
}

/// Listing site a property was found on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertySource {
    pub name: String,
    pub country: Country,
    pub website: String,
    pub logo_url: Option<String>,
}

/// Postal address of a property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

/// WGS84 position of a property
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Builds coordinates only when both halves of the pair are present.
    pub fn from_pair(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
                Some(Self {
                    latitude,
                    longitude,
                })
            }
            _ => None,
        }
    }
}

/// Core property data model
///
/// Every source adapter produces this shape. `id` is always prefixed with the
/// owning source's tag and `url` is the identity used to merge listings that
/// appear on more than one site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub area: Option<f64>,
    pub area_unit: Option<String>,
    pub address: Address,
    pub coordinates: Option<Coordinates>,
    pub images: Vec<String>,
    pub source: PropertySource,
    pub url: String,
    pub date_added: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
    pub features: Vec<String>,
    pub energy_class: Option<String>,
    pub is_active: bool,
    /// Not populated by the source adapters.
    pub source_id: Option<String>,
    /// Not populated by the source adapters.
    pub last_synced: Option<DateTime<Utc>>,
}

impl Property {
    /// Key used to detect the same listing surfaced by several sources
    pub fn dedup_key(&self) -> String {
        self.url.to_lowercase()
    }
}

/// Canonical search filters. All bounds are inclusive; `None` means unbounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertySearchFilters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub min_bedrooms: Option<u32>,
    pub max_bedrooms: Option<u32>,
    pub min_bathrooms: Option<u32>,
    pub max_bathrooms: Option<u32>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

impl PropertySearchFilters {
    /// Upper-cased country code, ignoring blank values
    pub fn country_code(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_uppercase)
    }

    /// Trimmed city name, ignoring blank values
    pub fn city_name(&self) -> Option<&str> {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|city| !city.is_empty())
    }
}

/// Availability snapshot of one source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    pub source: String,
    pub is_online: bool,
    pub last_checked: DateTime<Utc>,
    /// No source reports rate limits yet; always `None`.
    pub rate_limit_remaining: Option<u32>,
    pub rate_limit_reset: Option<DateTime<Utc>>,
}

/// One page of merged search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub properties: Vec<Property>,
    pub total_count: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl SearchResult {
    pub fn empty(page: u32) -> Self {
        Self {
            properties: Vec::new(),
            total_count: 0,
            has_next_page: false,
            has_previous_page: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_require_both_halves() {
        assert!(Coordinates::from_pair(Some(53.3), None).is_none());
        assert!(Coordinates::from_pair(None, Some(-6.2)).is_none());
        assert!(Coordinates::from_pair(Some(f64::NAN), Some(-6.2)).is_none());

        let coords = Coordinates::from_pair(Some(53.3), Some(-6.2)).unwrap();
        assert_eq!(coords.latitude, 53.3);
        assert_eq!(coords.longitude, -6.2);
    }

    #[test]
    fn blank_country_is_treated_as_absent() {
        let mut filters = PropertySearchFilters {
            country: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(filters.country_code(), None);

        filters.country = Some(" ie".to_string());
        assert_eq!(filters.country_code(), Some("IE".to_string()));
    }

    #[test]
    fn enums_use_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ListingType::ShortTermRental).unwrap(),
            "SHORT_TERM_RENTAL"
        );
        let parsed: PropertyType = serde_json::from_str("\"TOWNHOUSE\"").unwrap();
        assert_eq!(parsed, PropertyType::Townhouse);
    }

    #[test]
    fn filters_accept_camel_case_input() {
        let filters: PropertySearchFilters = serde_json::from_value(serde_json::json!({
            "minPrice": 100000,
            "listingType": "FOR_RENT",
            "maxBedrooms": 3
        }))
        .unwrap();

        assert_eq!(filters.min_price, Some(100000.0));
        assert_eq!(filters.listing_type, Some(ListingType::ForRent));
        assert_eq!(filters.max_bedrooms, Some(3));
        assert_eq!(filters.country, None);
    }

    #[test]
    fn empty_result_keeps_previous_page_flag() {
        assert!(!SearchResult::empty(1).has_previous_page);
        assert!(SearchResult::empty(3).has_previous_page);
    }
}
