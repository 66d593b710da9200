use crate::clients::traits::PropertyClient;
use crate::clients::types::{
    build_http_client, clamp_limit, collect_images, is_plain_id, non_empty, positive,
    positive_count, range_param, read_json, OneOrMany, Scalar, Truthy,
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
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SOURCE_NAME: &str = "ImmoScout24";
const COUNTRY: &str = "DE";
const COUNTRY_NAME: &str = "Germany";
const ID_PREFIX: &str = "immoscout24_";
const BASE_URL: &str = "https://rest.immobilienscout24.de/restapi/api/search/v1.0";
const WEBSITE: &str = "https://www.immobilienscout24.de";
const MAX_PAGE_SIZE: u32 = 100;
/// Region geocode sent for any city filter; ImmoScout24 needs its own region ids
const DEFAULT_GEOCODE: &str = "1276";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    resultlist_entries: Vec<ResultListPage>,
}

#[derive(Debug, Deserialize)]
struct ResultListPage {
    #[serde(rename = "resultlistEntry")]
    entries: Option<OneOrMany<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealEstate {
    #[serde(rename = "@id")]
    at_id: Option<Scalar>,
    id: Option<Scalar>,
    #[serde(rename = "@xsi.type")]
    xsi_type: Option<String>,
    title: Option<String>,
    description_note: Option<String>,
    price: Option<Price>,
    rent_price: Option<Price>,
    marketing_type: Option<String>,
    number_of_rooms: Option<Scalar>,
    number_of_bath_rooms: Option<Scalar>,
    living_space: Option<Scalar>,
    address: Option<RealEstateAddress>,
    attachments: Option<Attachments>,
    energy_efficiency_class: Option<String>,
    #[serde(default)]
    balcony: Truthy,
    #[serde(default)]
    garden: Truthy,
    #[serde(default)]
    lift: Truthy,
    #[serde(default)]
    built_in_kitchen: Truthy,
    #[serde(default)]
    cellar: Truthy,
    #[serde(default)]
    handicapped_accessible: Truthy,
}

#[derive(Debug, Deserialize)]
struct Price {
    value: Option<Scalar>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealEstateAddress {
    street: Option<String>,
    city: Option<String>,
    quarter: Option<String>,
    postcode: Option<Scalar>,
    wgs84_coordinate: Option<Wgs84Coordinate>,
}

#[derive(Debug, Deserialize)]
struct Wgs84Coordinate {
    latitude: Option<Scalar>,
    longitude: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    attachment: Option<OneOrMany<Attachment>>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "@xsi.type")]
    xsi_type: Option<String>,
    #[serde(default)]
    urls: Vec<AttachmentUrls>,
}

#[derive(Debug, Deserialize)]
struct AttachmentUrls {
    url: Option<AttachmentHref>,
}

#[derive(Debug, Deserialize)]
struct AttachmentHref {
    #[serde(alias = "@href")]
    href: Option<String>,
}

// ============================================================================
// Vocabulary
// ============================================================================

fn real_estate_type(kind: PropertyType) -> &'static str {
    match kind {
        PropertyType::Apartment | PropertyType::Studio | PropertyType::Other => "apartment",
        PropertyType::House | PropertyType::Villa | PropertyType::Townhouse => "house",
        PropertyType::Commercial => "office",
        PropertyType::Land => "plot",
    }
}

fn channel(listing: ListingType) -> &'static str {
    match listing {
        ListingType::ForSale => "buy",
        ListingType::ForRent | ListingType::ShortTermRental => "rent",
    }
}

fn canonical_type(xsi_type: Option<&str>) -> PropertyType {
    match xsi_type {
        Some("common:Apartment") => PropertyType::Apartment,
        Some("common:House" | "common:HouseBuy" | "common:HouseRent") => PropertyType::House,
        Some("common:Plot") => PropertyType::Land,
        Some("common:OfficeRent" | "common:OfficeBuy") => PropertyType::Commercial,
        _ => PropertyType::Other,
    }
}

// ============================================================================
// ImmoScout24Client
// ============================================================================

/// ImmoScout24 (Germany). Authenticates with a static API key sent as a
/// bearer token.
pub struct ImmoScout24Client {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl ImmoScout24Client {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.immoscout24_api_key.clone(), config.request_timeout)
    }

    /// Point the client at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.api_key.as_deref().ok_or(SourceError::NotConfigured {
            source_name: SOURCE_NAME,
        })
    }

    async fn fetch_search(
        &self,
        filters: &PropertySearchFilters,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Property>, SourceError> {
        let url = format!("{}/search/region", self.base_url);
        let params = build_search_params(filters, page, limit);

        debug!(source = SOURCE_NAME, %url, ?params, "Searching");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key()?))
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::http(SOURCE_NAME, e))?;

        let body: SearchResponse = read_json(SOURCE_NAME, response).await?;
        Ok(normalize_search_response(body, Utc::now()))
    }

    async fn fetch_expose(&self, native_id: &str) -> Result<Option<Property>, SourceError> {
        let url = format!("{}/expose/{}", self.base_url, native_id);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key()?))
            .send()
            .await
            .map_err(|e| SourceError::http(SOURCE_NAME, e))?;

        let body: Value = read_json(SOURCE_NAME, response).await?;
        normalize_entry(body, Utc::now())
    }
}

#[async_trait]
impl PropertyClient for ImmoScout24Client {
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
            warn!("ImmoScout24 API key not configured");
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

        match self.fetch_expose(native_id).await {
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
    let mut params = vec![
        ("pagenumber", page.max(1).to_string()),
        ("pagesize", clamp_limit(limit, MAX_PAGE_SIZE).to_string()),
    ];

    if let Some(price) = range_param(filters.min_price, filters.max_price, 0.0) {
        params.push(("price", price));
    }

    if let Some(kind) = filters.property_type {
        params.push(("realestatetype", real_estate_type(kind).to_string()));
    }

    if let Some(listing) = filters.listing_type {
        params.push(("channel", channel(listing).to_string()));
    }

    let rooms = range_param(
        filters.min_bedrooms.map(f64::from),
        filters.max_bedrooms.map(f64::from),
        1.0,
    );
    if let Some(rooms) = rooms {
        params.push(("numberofrooms", rooms));
    }

    if let Some(space) = range_param(filters.min_area, filters.max_area, 0.0) {
        params.push(("livingspace", space));
    }

    if filters.city_name().is_some() {
        params.push(("geocodes", DEFAULT_GEOCODE.to_string()));
    }

    params
}

// ============================================================================
// Response normalization
// ============================================================================

fn normalize_search_response(response: SearchResponse, now: DateTime<Utc>) -> Vec<Property> {
    let Some(entries) = response
        .resultlist_entries
        .into_iter()
        .next()
        .and_then(|page| page.entries)
    else {
        return Vec::new();
    };

    entries
        .into_vec()
        .into_iter()
        .filter_map(|entry| match normalize_entry(entry, now) {
            Ok(property) => property,
            Err(e) => {
                warn!(source = SOURCE_NAME, error = %e, "Skipping unreadable listing");
                None
            }
        })
        .collect()
}

/// Unwrap the real-estate object from a result-list entry or expose document
fn real_estate_value(entry: Value) -> Value {
    match entry {
        Value::Object(mut map) => {
            for key in ["resultlist.realEstate", "realEstate"] {
                if let Some(inner) = map.remove(key) {
                    return inner;
                }
            }
            if let Some(inner) = map.remove("resultlistEntry") {
                return real_estate_value(inner);
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn normalize_entry(entry: Value, now: DateTime<Utc>) -> Result<Option<Property>, SourceError> {
    let real_estate: RealEstate = serde_json::from_value(real_estate_value(entry))
        .map_err(|e| SourceError::decode(SOURCE_NAME, e))?;
    Ok(normalize_real_estate(real_estate, now))
}

fn normalize_real_estate(real_estate: RealEstate, now: DateTime<Utc>) -> Option<Property> {
    let Some(native_id) = real_estate
        .at_id
        .as_ref()
        .or(real_estate.id.as_ref())
        .map(Scalar::to_text)
        .filter(|id| !id.is_empty())
    else {
        debug!(source = SOURCE_NAME, "Listing without id skipped");
        return None;
    };

    let price = real_estate.price.as_ref().or(real_estate.rent_price.as_ref());
    let currency = real_estate
        .price
        .as_ref()
        .and_then(|p| p.currency.clone())
        .or_else(|| real_estate.rent_price.as_ref().and_then(|p| p.currency.clone()))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let listing_type = match real_estate.marketing_type.as_deref() {
        Some("RENT") => ListingType::ForRent,
        _ => ListingType::ForSale,
    };

    let features = extract_features(&real_estate);
    let images = extract_images(real_estate.attachments);
    let address = real_estate.address;

    let coordinates = address
        .as_ref()
        .and_then(|a| a.wgs84_coordinate.as_ref())
        .and_then(|c| {
            Coordinates::from_pair(
                c.latitude.as_ref().and_then(Scalar::as_f64),
                c.longitude.as_ref().and_then(Scalar::as_f64),
            )
        });

    let address = match address {
        Some(a) => Address {
            street: non_empty(a.street),
            city: non_empty(a.city).unwrap_or_else(|| COUNTRY_NAME.to_string()),
            region: non_empty(a.quarter),
            postal_code: a.postcode.as_ref().map(Scalar::to_text),
            country: COUNTRY_NAME.to_string(),
        },
        None => Address {
            street: None,
            city: COUNTRY_NAME.to_string(),
            region: None,
            postal_code: None,
            country: COUNTRY_NAME.to_string(),
        },
    };

    Some(Property {
        id: format!("{}{}", ID_PREFIX, native_id),
        title: non_empty(real_estate.title).unwrap_or_else(|| format!("Property in {}", COUNTRY_NAME)),
        description: non_empty(real_estate.description_note),
        price: price
            .and_then(|p| p.value.as_ref())
            .and_then(Scalar::as_f64)
            .unwrap_or(0.0)
            .max(0.0),
        currency,
        property_type: canonical_type(real_estate.xsi_type.as_deref()),
        listing_type,
        bedrooms: positive_count(real_estate.number_of_rooms.as_ref()),
        bathrooms: positive_count(real_estate.number_of_bath_rooms.as_ref()),
        area: positive(real_estate.living_space.as_ref()),
        area_unit: Some("m²".to_string()),
        address,
        coordinates,
        images,
        source: reference::source(SOURCE_NAME, COUNTRY, WEBSITE),
        url: format!("{}/expose/{}", WEBSITE, native_id),
        // ImmoScout24 does not report a listing date
        date_added: now,
        date_updated: None,
        features,
        energy_class: non_empty(real_estate.energy_efficiency_class),
        is_active: true,
        source_id: None,
        last_synced: None,
    })
}

fn extract_images(attachments: Option<Attachments>) -> Vec<String> {
    let pictures = attachments
        .and_then(|a| a.attachment)
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter(|att| att.xsi_type.as_deref() == Some("common:Picture"))
        .filter_map(|att| att.urls.into_iter().next())
        .filter_map(|urls| urls.url.and_then(|u| u.href));

    collect_images(None, pictures)
}

fn extract_features(real_estate: &RealEstate) -> Vec<String> {
    [
        (real_estate.balcony, "Balcony"),
        (real_estate.garden, "Garden"),
        (real_estate.lift, "Elevator"),
        (real_estate.built_in_kitchen, "Built-in Kitchen"),
        (real_estate.cellar, "Cellar"),
        (real_estate.handicapped_accessible, "Handicapped Accessible"),
    ]
    .into_iter()
    .filter(|(flag, _)| flag.0)
    .map(|(_, label)| label.to_string())
    .collect()
}
