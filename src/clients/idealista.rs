use crate::clients::token::{TokenGrant, TokenManager};
use crate::clients::traits::PropertyClient;
use crate::clients::types::{
    build_http_client, clamp_limit, collect_images, decode_each, format_number, is_plain_id,
    non_empty, positive, positive_count, read_json, Scalar, Truthy,
};
use crate::config::Config;
use crate::error::SourceError;
use crate::models::{
    Address, Coordinates, ListingType, Property, PropertySearchFilters, PropertyType,
    DEFAULT_CURRENCY,
};
use crate::reference;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "Idealista";
const COUNTRY: &str = "ES";
const ID_PREFIX: &str = "idealista_";
const BASE_URL: &str = "https://api.idealista.com/3.5";
const TOKEN_URL: &str = "https://api.idealista.com/oauth/token";
const WEBSITE: &str = "https://www.idealista.com";
const MAX_PAGE_SIZE: u32 = 50;
/// Search radius in meters around a city centre
const CITY_RADIUS_METERS: u32 = 20_000;

/// Country paths Idealista serves, (path, name)
const MARKETS: &[(&str, &str)] = &[("es", "Spain"), ("it", "Italy"), ("pt", "Portugal")];

fn market_name(market: &str) -> &'static str {
    MARKETS
        .iter()
        .find(|(path, _)| *path == market)
        .map(|(_, name)| *name)
        .unwrap_or("Spain")
}

/// API path segment for the filter country, Spain unless IT or PT is asked for
fn market_for(filters: &PropertySearchFilters) -> &'static str {
    let code = filters.country_code().unwrap_or_default().to_lowercase();
    MARKETS
        .iter()
        .find(|(path, _)| *path == code)
        .map(|(path, _)| *path)
        .unwrap_or("es")
}

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    element_list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Element {
    property_code: Option<Scalar>,
    address: Option<String>,
    description: Option<String>,
    price: Option<Scalar>,
    property_type: Option<String>,
    operation: Option<String>,
    rooms: Option<Scalar>,
    bathrooms: Option<Scalar>,
    size: Option<Scalar>,
    municipality: Option<String>,
    province: Option<String>,
    latitude: Option<Scalar>,
    longitude: Option<Scalar>,
    url: Option<String>,
    multimedia: Option<Multimedia>,
    #[serde(default)]
    has_video: Truthy,
    #[serde(default, rename = "has3DTour")]
    has_3d_tour: Truthy,
    #[serde(default)]
    has_plan: Truthy,
    parking_space: Option<ParkingSpace>,
    #[serde(default)]
    exterior: Truthy,
    energy_certification: Option<EnergyCertification>,
}

#[derive(Debug, Deserialize)]
struct Multimedia {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParkingSpace {
    #[serde(default)]
    has_parking_space: Truthy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnergyCertification {
    energy_consumption: Option<EnergyConsumption>,
}

#[derive(Debug, Deserialize)]
struct EnergyConsumption {
    #[serde(rename = "type")]
    class: Option<String>,
}

impl Element {
    fn energy_class(&self) -> Option<String> {
        self.energy_certification
            .as_ref()
            .and_then(|c| c.energy_consumption.as_ref())
            .and_then(|c| non_empty(c.class.clone()))
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

fn idealista_type(kind: PropertyType) -> &'static str {
    match kind {
        PropertyType::Apartment | PropertyType::Other => "flat",
        PropertyType::House | PropertyType::Villa => "chalet",
        PropertyType::Townhouse => "duplex",
        PropertyType::Studio => "studio",
        PropertyType::Commercial => "office",
        PropertyType::Land => "land",
    }
}

fn canonical_type(code: Option<&str>) -> PropertyType {
    match code {
        Some("flat") => PropertyType::Apartment,
        Some("chalet") => PropertyType::House,
        Some("duplex") => PropertyType::Townhouse,
        Some("studio") => PropertyType::Studio,
        Some("office") => PropertyType::Commercial,
        Some("land") => PropertyType::Land,
        // garage, storage and anything unknown
        _ => PropertyType::Other,
    }
}

fn operation(listing: ListingType) -> &'static str {
    match listing {
        ListingType::ForSale => "sale",
        ListingType::ForRent | ListingType::ShortTermRental => "rent",
    }
}

// ============================================================================
// IdealistaClient
// ============================================================================

/// Idealista (Spain, Italy, Portugal). Uses an OAuth2 client-credentials
/// token obtained from the API key and secret.
pub struct IdealistaClient {
    client: Client,
    api_key: Option<String>,
    api_secret: Option<String>,
    base_url: String,
    token_url: String,
    tokens: TokenManager,
}

impl IdealistaClient {
    pub fn new(api_key: Option<String>, api_secret: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            api_secret,
            base_url: BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            tokens: TokenManager::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.idealista_api_key.clone(),
            config.idealista_api_secret.clone(),
            config.request_timeout,
        )
    }

    /// Point the client at another API root and token endpoint
    pub fn with_endpoints(mut self, base_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.token_url = token_url.into();
        self
    }

    async fn access_token(&self) -> Result<String, SourceError> {
        self.tokens.access_token(|| self.request_token()).await
    }

    async fn request_token(&self) -> Result<TokenGrant, SourceError> {
        let (Some(key), Some(secret)) = (self.api_key.as_deref(), self.api_secret.as_deref()) else {
            return Err(SourceError::NotConfigured {
                source_name: SOURCE_NAME,
            });
        };

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(key, Some(secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "read")])
            .send()
            .await
            .map_err(|e| SourceError::Auth {
                source_name: SOURCE_NAME,
                message: e.to_string(),
            })?;

        read_json(SOURCE_NAME, response)
            .await
            .map_err(|e| SourceError::Auth {
                source_name: SOURCE_NAME,
                message: e.to_string(),
            })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&'static str, String)],
    ) -> Result<SearchResponse, SourceError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .map_err(|e| SourceError::http(SOURCE_NAME, e))?;

        read_json(SOURCE_NAME, response).await
    }

    async fn fetch_search(
        &self,
        filters: &PropertySearchFilters,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Property>, SourceError> {
        let market = market_for(filters);
        let url = format!("{}/{}/search", self.base_url, market);
        let form = build_search_params(filters, market, page, limit);

        debug!(source = SOURCE_NAME, %url, ?form, "Searching");

        let response = self.post_form(&url, &form).await?;
        Ok(normalize_search_response(response, market, Utc::now()))
    }

    async fn fetch_detail(&self, market: &'static str, code: &str) -> Result<Option<Property>, SourceError> {
        let url = format!("{}/{}/detail", self.base_url, market);
        let form = [("propertyCode", code.to_string())];

        let response = self.post_form(&url, &form).await?;

        Ok(normalize_search_response(response, market, Utc::now())
            .into_iter()
            .next())
    }
}

/// Split `idealista_<market>_<code>` into its market path and native code
fn parse_id(id: &str) -> Result<(&'static str, &str), SourceError> {
    let invalid = || SourceError::InvalidId {
        source_name: SOURCE_NAME,
        id: id.to_string(),
    };

    let rest = id.strip_prefix(ID_PREFIX).ok_or_else(invalid)?;
    let (market, code) = rest.split_once('_').ok_or_else(invalid)?;
    let market = MARKETS
        .iter()
        .find(|(path, _)| *path == market)
        .map(|(path, _)| *path)
        .ok_or_else(invalid)?;

    if !is_plain_id(code) {
        return Err(invalid());
    }
    Ok((market, code))
}

#[async_trait]
impl PropertyClient for IdealistaClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn country(&self) -> &'static str {
        COUNTRY
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    async fn search(&self, filters: &PropertySearchFilters, page: u32, limit: u32) -> Vec<Property> {
        if !self.is_available() {
            warn!("Idealista API credentials not configured");
            return Vec::new();
        }

        match self.fetch_search(filters, page, limit).await {
            Ok(properties) => {
                info!(source = SOURCE_NAME, count = properties.len(), "Search completed");
                properties
            }
            Err(e) => {
                error!(source = SOURCE_NAME, error = %e, ?filters, page, limit, "Search failed");
                Vec::new()
            }
        }
    }

    async fn get_property(&self, id: &str) -> Option<Property> {
        if !self.is_available() || !id.starts_with(ID_PREFIX) {
            return None;
        }

        let result = match parse_id(id) {
            Ok((market, code)) => self.fetch_detail(market, code).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(property) => property,
            Err(e) => {
                error!(source = SOURCE_NAME, error = %e, id, "Property lookup failed");
                None
            }
        }
    }
}

// ============================================================================
// Request mapping
// ============================================================================

fn build_search_params(
    filters: &PropertySearchFilters,
    market: &str,
    page: u32,
    limit: u32,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("maxItems", clamp_limit(limit, MAX_PAGE_SIZE).to_string()),
        ("numPage", page.max(1).to_string()),
        ("order", "publicationDate".to_string()),
    ];

    match filters.city_name() {
        Some(city) => {
            params.push(("center", city.to_string()));
            params.push(("distance", CITY_RADIUS_METERS.to_string()));
        }
        None => params.push(("locationId", format!("0-EU-{}", market.to_uppercase()))),
    }

    if let Some(min) = filters.min_price {
        params.push(("minPrice", format_number(min)));
    }
    if let Some(max) = filters.max_price {
        params.push(("maxPrice", format_number(max)));
    }

    if let Some(kind) = filters.property_type {
        params.push(("propertyType", idealista_type(kind).to_string()));
    }

    if let Some(listing) = filters.listing_type {
        params.push(("operation", operation(listing).to_string()));
    }

    if let Some(min) = filters.min_bedrooms {
        params.push(("minRooms", min.to_string()));
    }
    if let Some(max) = filters.max_bedrooms {
        params.push(("maxRooms", max.to_string()));
    }

    if let Some(min) = filters.min_area {
        params.push(("minSize", format_number(min)));
    }
    if let Some(max) = filters.max_area {
        params.push(("maxSize", format_number(max)));
    }

    params
}

// ============================================================================
// Response normalization
// ============================================================================

fn normalize_search_response(
    response: SearchResponse,
    market: &str,
    now: DateTime<Utc>,
) -> Vec<Property> {
    decode_each::<Element>(SOURCE_NAME, response.element_list)
        .into_iter()
        .filter_map(|element| normalize_element(element, market, now))
        .collect()
}

fn normalize_element(element: Element, market: &str, now: DateTime<Utc>) -> Option<Property> {
    let Some(code) = element
        .property_code
        .as_ref()
        .map(Scalar::to_text)
        .filter(|code| !code.is_empty())
    else {
        debug!(source = SOURCE_NAME, "Listing without propertyCode skipped");
        return None;
    };

    let country_name = market_name(market);
    let features = extract_features(&element);
    let energy_class = element.energy_class();
    let coordinates = Coordinates::from_pair(
        element.latitude.as_ref().and_then(Scalar::as_f64),
        element.longitude.as_ref().and_then(Scalar::as_f64),
    );
    let images = collect_images(
        None,
        element
            .multimedia
            .map(|m| m.images)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|img| img.url),
    );
    let street = non_empty(element.address);

    Some(Property {
        id: format!("{}{}_{}", ID_PREFIX, market, code),
        title: street
            .clone()
            .unwrap_or_else(|| format!("Property in {}", country_name)),
        description: non_empty(element.description),
        price: element
            .price
            .as_ref()
            .and_then(Scalar::as_f64)
            .unwrap_or(0.0)
            .max(0.0),
        currency: DEFAULT_CURRENCY.to_string(),
        property_type: canonical_type(element.property_type.as_deref()),
        listing_type: match element.operation.as_deref() {
            Some("sale") => ListingType::ForSale,
            _ => ListingType::ForRent,
        },
        bedrooms: positive_count(element.rooms.as_ref()),
        bathrooms: positive_count(element.bathrooms.as_ref()),
        area: positive(element.size.as_ref()),
        area_unit: Some("m²".to_string()),
        address: Address {
            street,
            city: non_empty(element.municipality).unwrap_or_else(|| country_name.to_string()),
            region: non_empty(element.province),
            postal_code: None,
            country: country_name.to_string(),
        },
        coordinates,
        images,
        source: reference::source(SOURCE_NAME, market, WEBSITE),
        url: non_empty(element.url).unwrap_or_else(|| format!("{}/inmueble/{}", WEBSITE, code)),
        // Search results carry no publication date
        date_added: now,
        date_updated: None,
        features,
        energy_class,
        is_active: true,
        source_id: None,
        last_synced: None,
    })
}

fn extract_features(element: &Element) -> Vec<String> {
    let has_parking = element
        .parking_space
        .as_ref()
        .map(|p| p.has_parking_space.0)
        .unwrap_or(false);

    let mut features: Vec<String> = [
        (element.has_video.0, "Video Tour"),
        (element.has_3d_tour.0, "3D Tour"),
        (element.has_plan.0, "Floor Plan"),
        (has_parking, "Parking"),
        (element.exterior.0, "Exterior"),
    ]
    .into_iter()
    .filter(|(flag, _)| *flag)
    .map(|(_, label)| label.to_string())
    .collect();

    if let Some(class) = element.energy_class() {
        features.push(format!("Energy Class {}", class));
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn market_follows_filter_country() {
        let mut filters = PropertySearchFilters::default();
        assert_eq!(market_for(&filters), "es");

        filters.country = Some("it".to_string());
        assert_eq!(market_for(&filters), "it");

        filters.country = Some("FR".to_string());
        assert_eq!(market_for(&filters), "es");
    }

    #[test]
    fn builds_form_fields() {
        let filters = PropertySearchFilters {
            min_price: Some(150000.0),
            max_price: Some(300000.0),
            property_type: Some(PropertyType::Townhouse),
            listing_type: Some(ListingType::ForSale),
            min_bedrooms: Some(2),
            max_area: Some(120.5),
            city: Some("Madrid".to_string()),
            ..Default::default()
        };

        let params = build_search_params(&filters, "es", 3, 80);

        assert_eq!(param(&params, "maxItems"), Some("50"));
        assert_eq!(param(&params, "numPage"), Some("3"));
        assert_eq!(param(&params, "order"), Some("publicationDate"));
        assert_eq!(param(&params, "center"), Some("Madrid"));
        assert_eq!(param(&params, "distance"), Some("20000"));
        assert_eq!(param(&params, "locationId"), None);
        assert_eq!(param(&params, "minPrice"), Some("150000"));
        assert_eq!(param(&params, "maxPrice"), Some("300000"));
        assert_eq!(param(&params, "propertyType"), Some("duplex"));
        assert_eq!(param(&params, "operation"), Some("sale"));
        assert_eq!(param(&params, "minRooms"), Some("2"));
        assert_eq!(param(&params, "maxRooms"), None);
        assert_eq!(param(&params, "maxSize"), Some("120.5"));
    }

    #[test]
    fn defaults_to_country_location() {
        let params = build_search_params(&PropertySearchFilters::default(), "pt", 1, 20);
        assert_eq!(param(&params, "locationId"), Some("0-EU-PT"));
        assert_eq!(param(&params, "operation"), None);
    }

    #[test]
    fn normalizes_element() {
        let now = Utc::now();
        let element: Element = serde_json::from_value(json!({
            "propertyCode": "98765",
            "address": "Calle de Alcalá",
            "price": 275000.0,
            "propertyType": "flat",
            "operation": "sale",
            "rooms": 3,
            "bathrooms": 2,
            "size": 95,
            "municipality": "Madrid",
            "province": "Madrid",
            "latitude": "40.42",
            "longitude": "-3.69",
            "url": "https://www.idealista.com/inmueble/98765/",
            "multimedia": { "images": [{ "url": "https://img/a.jpg" }, { "url": "https://img/a.jpg" }, {}] },
            "hasVideo": true,
            "has3DTour": false,
            "parkingSpace": { "hasParkingSpace": true },
            "exterior": true,
            "energyCertification": { "energyConsumption": { "type": "D" } }
        }))
        .unwrap();

        let p = normalize_element(element, "es", now).unwrap();

        assert_eq!(p.id, "idealista_es_98765");
        assert_eq!(p.title, "Calle de Alcalá");
        assert_eq!(p.price, 275000.0);
        assert_eq!(p.property_type, PropertyType::Apartment);
        assert_eq!(p.listing_type, ListingType::ForSale);
        assert_eq!(p.bedrooms, Some(3));
        assert_eq!(p.bathrooms, Some(2));
        assert_eq!(p.area, Some(95.0));
        assert_eq!(p.address.city, "Madrid");
        assert_eq!(p.address.country, "Spain");
        assert_eq!(p.coordinates.unwrap().longitude, -3.69);
        assert_eq!(p.images, vec!["https://img/a.jpg"]);
        assert_eq!(
            p.features,
            vec!["Video Tour", "Parking", "Exterior", "Energy Class D"]
        );
        assert_eq!(p.energy_class.as_deref(), Some("D"));
        assert_eq!(p.source.country.code, "ES");
        assert_eq!(p.source.country.name, "Spain");
    }

    #[test]
    fn sparse_element_uses_fallbacks() {
        let element: Element = serde_json::from_value(json!({
            "propertyCode": 42,
            "propertyType": "garage",
            "operation": "rent"
        }))
        .unwrap();

        let p = normalize_element(element, "it", Utc::now()).unwrap();

        assert_eq!(p.id, "idealista_it_42");
        assert_eq!(p.title, "Property in Italy");
        assert_eq!(p.address.city, "Italy");
        assert_eq!(p.url, "https://www.idealista.com/inmueble/42");
        assert_eq!(p.property_type, PropertyType::Other);
        assert_eq!(p.listing_type, ListingType::ForRent);
        assert!(p.features.is_empty());
        assert!(p.coordinates.is_none());
    }

    #[test]
    fn malformed_element_does_not_sink_the_page() {
        let response: SearchResponse = serde_json::from_value(json!({
            "elementList": [
                { "propertyCode": "100", "price": 250000, "url": "https://www.idealista.com/inmueble/100/" },
                { "propertyCode": "101", "address": 42 },
                "not an element"
            ]
        }))
        .unwrap();

        let properties = normalize_search_response(response, "es", Utc::now());
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].id, "idealista_es_100");
    }

    #[test]
    fn parses_composite_ids() {
        assert_eq!(parse_id("idealista_pt_555").unwrap(), ("pt", "555"));
        assert!(parse_id("idealista_fr_555").is_err());
        assert!(parse_id("idealista_es_").is_err());
        assert!(parse_id("idealista_es_1&propertyCode=2").is_err());
        assert!(parse_id("daft_1").is_err());
    }

    #[tokio::test]
    async fn requires_key_and_secret() {
        let only_key = IdealistaClient::new(Some("key".into()), None, Duration::from_secs(1)).unwrap();
        assert!(!only_key.is_available());
        assert!(only_key
            .search(&PropertySearchFilters::default(), 1, 20)
            .await
            .is_empty());

        let both = IdealistaClient::new(Some("key".into()), Some("secret".into()), Duration::from_secs(1)).unwrap();
        assert!(both.is_available());
    }

    #[tokio::test]
    async fn token_failure_degrades_to_empty() {
        let client = IdealistaClient::new(Some("key".into()), Some("secret".into()), Duration::from_secs(2))
            .unwrap()
            .with_endpoints("http://127.0.0.1:1/3.5", "http://127.0.0.1:1/oauth/token");

        assert!(client
            .search(&PropertySearchFilters::default(), 1, 20)
            .await
            .is_empty());
        assert!(client.get_property("idealista_es_1").await.is_none());
        assert!(client.get_property("immoscout24_1").await.is_none());
    }
}
