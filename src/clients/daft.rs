use crate::clients::traits::PropertyClient;
use crate::clients::types::{
    build_http_client, clamp_limit, collect_images, decode_each, format_number, is_plain_id,
    non_empty, parse_timestamp, positive, positive_count, read_json, OneOrMany, Scalar, Truthy,
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

const SOURCE_NAME: &str = "Daft";
const COUNTRY: &str = "IE";
const COUNTRY_NAME: &str = "Ireland";
const ID_PREFIX: &str = "daft_";
const BASE_URL: &str = "https://api.daft.ie/v3";
const WEBSITE: &str = "https://www.daft.ie";
const MAX_PAGE_SIZE: u32 = 20;
const DEFAULT_CITY: &str = "Dublin";

/// City names Daft accepts as `area` slugs; anything else searches Dublin
const AREAS: &[&str] = &["dublin", "cork", "galway", "limerick", "waterford"];

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    properties: Option<OneOrMany<Value>>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    property: Option<DaftProperty>,
}

#[derive(Debug, Deserialize)]
struct DaftProperty {
    id: Option<Scalar>,
    title: Option<String>,
    address: Option<String>,
    description: Option<String>,
    price: Option<Scalar>,
    property_type: Option<String>,
    section: Option<String>,
    bedrooms: Option<Scalar>,
    beds: Option<Scalar>,
    bathrooms: Option<Scalar>,
    baths: Option<Scalar>,
    size: Option<Scalar>,
    size_type: Option<String>,
    street: Option<String>,
    area: Option<String>,
    county: Option<String>,
    eircode: Option<String>,
    latitude: Option<Scalar>,
    longitude: Option<Scalar>,
    images: Option<OneOrMany<DaftImage>>,
    main_photo: Option<String>,
    daft_url: Option<String>,
    url: Option<String>,
    date_entered: Option<String>,
    date_updated: Option<String>,
    ber_rating: Option<String>,
    furnished: Option<String>,
    #[serde(default)]
    garage: Truthy,
    #[serde(default)]
    garden: Truthy,
    #[serde(default)]
    parking: Truthy,
    #[serde(default)]
    alarm: Truthy,
    #[serde(default)]
    cable_tv: Truthy,
    #[serde(default)]
    dish_washer: Truthy,
    #[serde(default)]
    dryer: Truthy,
    #[serde(default)]
    washing_machine: Truthy,
}

/// Daft lists images either as bare URLs or as `{ "url": ... }` objects
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DaftImage {
    Url(String),
    Object { url: Option<String> },
}

impl DaftImage {
    fn into_url(self) -> Option<String> {
        match self {
            Self::Url(url) => Some(url),
            Self::Object { url } => url,
        }
    }
}

// ============================================================================
// Vocabulary
// ============================================================================

fn daft_type(kind: PropertyType) -> &'static str {
    match kind {
        PropertyType::Apartment => "apartment",
        PropertyType::House | PropertyType::Villa | PropertyType::Townhouse | PropertyType::Other => {
            "house"
        }
        PropertyType::Studio => "studio",
        PropertyType::Commercial => "commercial",
        PropertyType::Land => "site",
    }
}

fn canonical_type(code: Option<&str>) -> PropertyType {
    match code {
        Some("apartment") => PropertyType::Apartment,
        Some("house") => PropertyType::House,
        Some("studio") => PropertyType::Studio,
        Some("commercial") => PropertyType::Commercial,
        Some("site") => PropertyType::Land,
        Some("duplex") => PropertyType::Townhouse,
        _ => PropertyType::Other,
    }
}

fn section(listing: Option<ListingType>) -> &'static str {
    match listing {
        Some(ListingType::ForRent | ListingType::ShortTermRental) => "residential-to-let",
        Some(ListingType::ForSale) | None => "residential-for-sale",
    }
}

fn area_slug(city: &str) -> &'static str {
    let city = city.to_lowercase();
    AREAS
        .iter()
        .find(|slug| **slug == city)
        .copied()
        .unwrap_or("dublin")
}

// ============================================================================
// DaftClient
// ============================================================================

/// Daft.ie (Ireland). The API key travels as a form field.
pub struct DaftClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl DaftClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.daft_api_key.clone(), config.request_timeout)
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<T, SourceError> {
        let api_key = self.api_key.clone().ok_or(SourceError::NotConfigured {
            source_name: SOURCE_NAME,
        })?;
        form.insert(0, ("api_key", api_key));

        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .form(&form)
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
        let params = build_search_params(filters, page, limit);
        debug!(source = SOURCE_NAME, ?params, "Searching");

        let response: SearchResponse = self.post_form("/search", params).await?;
        Ok(normalize_search_response(response, Utc::now()))
    }

    async fn fetch_property(&self, native_id: &str) -> Result<Option<Property>, SourceError> {
        let response: DetailResponse = self
            .post_form("/property", vec![("id", native_id.to_string())])
            .await?;

        Ok(response
            .property
            .and_then(|prop| normalize_property(prop, Utc::now())))
    }
}

#[async_trait]
impl PropertyClient for DaftClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn country(&self) -> &'static str {
        COUNTRY
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, filters: &PropertySearchFilters, page: u32, limit: u32) -> Vec<Property> {
        if !self.is_available() {
            warn!("Daft API key not configured");
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
        if !self.is_available() {
            return None;
        }

        let native_id = id.strip_prefix(ID_PREFIX)?;
        if !is_plain_id(native_id) {
            warn!(source = SOURCE_NAME, id, "Property id is not a plain listing id");
            return None;
        }

        match self.fetch_property(native_id).await {
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
    page: u32,
    limit: u32,
) -> Vec<(&'static str, String)> {
    // offset uses the requested page size, not the clamped one
    let offset = page.max(1).saturating_sub(1).saturating_mul(limit);

    let mut params = vec![
        ("offset", offset.to_string()),
        ("limit", clamp_limit(limit, MAX_PAGE_SIZE).to_string()),
        ("section", section(filters.listing_type).to_string()),
    ];

    if let Some(min) = filters.min_price {
        params.push(("min_price", format_number(min)));
    }
    if let Some(max) = filters.max_price {
        params.push(("max_price", format_number(max)));
    }

    if let Some(kind) = filters.property_type {
        params.push(("property_type", daft_type(kind).to_string()));
    }

    if let Some(min) = filters.min_bedrooms {
        params.push(("min_beds", min.to_string()));
    }
    if let Some(max) = filters.max_bedrooms {
        params.push(("max_beds", max.to_string()));
    }

    if let Some(min) = filters.min_bathrooms {
        params.push(("min_baths", min.to_string()));
    }
    if let Some(max) = filters.max_bathrooms {
        params.push(("max_baths", max.to_string()));
    }

    if let Some(city) = filters.city_name() {
        params.push(("area", area_slug(city).to_string()));
    }

    params
}

// ============================================================================
// Response normalization
// ============================================================================

fn normalize_search_response(response: SearchResponse, now: DateTime<Utc>) -> Vec<Property> {
    let entries = response
        .properties
        .map(OneOrMany::into_vec)
        .unwrap_or_default();

    decode_each::<DaftProperty>(SOURCE_NAME, entries)
        .into_iter()
        .filter_map(|prop| normalize_property(prop, now))
        .collect()
}

fn normalize_property(prop: DaftProperty, now: DateTime<Utc>) -> Option<Property> {
    let Some(native_id) = prop
        .id
        .as_ref()
        .map(Scalar::to_text)
        .filter(|id| !id.is_empty())
    else {
        debug!(source = SOURCE_NAME, "Listing without id skipped");
        return None;
    };

    let features = extract_features(&prop);
    let coordinates = Coordinates::from_pair(
        prop.latitude.as_ref().and_then(Scalar::as_f64),
        prop.longitude.as_ref().and_then(Scalar::as_f64),
    );
    let date_added = prop
        .date_entered
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let date_updated = prop.date_updated.as_deref().and_then(parse_timestamp);
    let listing_type = match prop.section.as_deref() {
        Some(section) if section.contains("sale") => ListingType::ForSale,
        _ => ListingType::ForRent,
    };
    let area_unit = match prop.size_type.as_deref() {
        Some("acres") => "acres",
        _ => "m²",
    };

    let address_line = non_empty(prop.address);
    let county = non_empty(prop.county);
    let images = collect_images(
        non_empty(prop.main_photo),
        prop.images
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(DaftImage::into_url),
    );

    Some(Property {
        id: format!("{}{}", ID_PREFIX, native_id),
        title: non_empty(prop.title)
            .or_else(|| address_line.clone())
            .unwrap_or_else(|| format!("Property in {}", COUNTRY_NAME)),
        description: non_empty(prop.description),
        price: prop
            .price
            .as_ref()
            .and_then(Scalar::as_f64)
            .unwrap_or(0.0)
            .max(0.0),
        currency: DEFAULT_CURRENCY.to_string(),
        property_type: canonical_type(prop.property_type.as_deref()),
        listing_type,
        bedrooms: positive_count(prop.bedrooms.as_ref().or(prop.beds.as_ref())),
        bathrooms: positive_count(prop.bathrooms.as_ref().or(prop.baths.as_ref())),
        area: positive(prop.size.as_ref()),
        area_unit: Some(area_unit.to_string()),
        address: Address {
            street: non_empty(prop.street),
            city: non_empty(prop.area)
                .or_else(|| county.clone())
                .unwrap_or_else(|| DEFAULT_CITY.to_string()),
            region: county,
            postal_code: non_empty(prop.eircode),
            country: COUNTRY_NAME.to_string(),
        },
        coordinates,
        images,
        source: reference::source(SOURCE_NAME, COUNTRY, WEBSITE),
        url: non_empty(prop.daft_url)
            .or_else(|| non_empty(prop.url))
            .unwrap_or_else(|| format!("{}/property/{}", WEBSITE, native_id)),
        date_added,
        date_updated,
        features,
        energy_class: non_empty(prop.ber_rating),
        is_active: true,
        source_id: None,
        last_synced: None,
    })
}

fn extract_features(prop: &DaftProperty) -> Vec<String> {
    let mut features: Vec<String> = [
        (prop.garage, "Garage"),
        (prop.garden, "Garden"),
        (prop.parking, "Parking"),
        (prop.alarm, "Alarm"),
        (prop.cable_tv, "Cable TV"),
        (prop.dish_washer, "Dishwasher"),
        (prop.dryer, "Dryer"),
        (prop.washing_machine, "Washing Machine"),
    ]
    .into_iter()
    .filter(|(flag, _)| flag.0)
    .map(|(_, label)| label.to_string())
    .collect();

    match prop.furnished.as_deref() {
        Some("furnished") => features.push("Furnished".to_string()),
        Some("part_furnished") => features.push("Part Furnished".to_string()),
        _ => {}
    }

    if let Some(rating) = prop.ber_rating.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        features.push(format!("BER Rating: {}", rating));
    }

    features
}
