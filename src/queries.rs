//! Query surface over the aggregator: argument defaults, validation, logging,
//! static reference data and conversion of unexpected failures into generic
//! user-facing errors.

use crate::aggregator::PropertyAggregator;
use crate::error::QueryError;
use crate::models::{ApiStatus, Country, Property, PropertySearchFilters, PropertySource, SearchResult};
use crate::reference;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_SORT_KEY: &str = "dateAdded";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Arguments of a property search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub filters: PropertySearchFilters,
    pub page: u32,
    pub limit: u32,
    /// Accepted for compatibility; results are always newest first
    pub sort_by: String,
    /// Accepted for compatibility; results are always newest first
    pub sort_order: SortOrder,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            filters: PropertySearchFilters::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort_by: DEFAULT_SORT_KEY.to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

/// Reject bound pairs that cannot match anything
fn validate_filters(filters: &PropertySearchFilters) -> Result<(), String> {
    fn check<T: PartialOrd + std::fmt::Display>(name: &str, min: Option<T>, max: Option<T>) -> Result<(), String> {
        match (min, max) {
            (Some(min), Some(max)) if min > max => {
                Err(format!("min{name} ({min}) is greater than max{name} ({max})"))
            }
            _ => Ok(()),
        }
    }

    let negative = [
        ("minPrice", filters.min_price),
        ("maxPrice", filters.max_price),
        ("minArea", filters.min_area),
        ("maxArea", filters.max_area),
    ]
    .into_iter()
    .find(|(_, value)| value.map(|v| v < 0.0 || !v.is_finite()).unwrap_or(false));

    if let Some((name, value)) = negative {
        return Err(format!("{name} must be a non-negative number, got {value:?}"));
    }

    check("Price", filters.min_price, filters.max_price)?;
    check("Bedrooms", filters.min_bedrooms, filters.max_bedrooms)?;
    check("Bathrooms", filters.min_bathrooms, filters.max_bathrooms)?;
    check("Area", filters.min_area, filters.max_area)
}

/// Operations exposed to the consumer-facing query layer
#[derive(Clone)]
pub struct PropertyQueries {
    aggregator: Arc<PropertyAggregator>,
}

impl PropertyQueries {
    pub fn new(aggregator: Arc<PropertyAggregator>) -> Self {
        Self { aggregator }
    }

    /// Merged, deduplicated, newest-first page of listings
    pub async fn properties(&self, request: SearchRequest) -> Result<SearchResult, QueryError> {
        let SearchRequest {
            filters,
            page,
            limit,
            sort_by,
            sort_order,
        } = request;

        let page = page.max(1);
        let limit = limit.clamp(1, MAX_LIMIT);

        info!(?filters, page, limit, %sort_by, ?sort_order, "Searching properties");

        if let Err(reason) = validate_filters(&filters) {
            warn!(%reason, "Rejected search filters");
            return Err(QueryError::InvalidFilters { reason });
        }

        let aggregator = Arc::clone(&self.aggregator);
        let task_filters = filters.clone();
        let result = tokio::spawn(async move { aggregator.search(&task_filters, page, limit).await })
            .await
            .map_err(|e| {
                error!(?filters, page, limit, error = %e, "Property search failed");
                QueryError::SearchFailed
            })?;

        info!(
            total_count = result.total_count,
            returned_count = result.properties.len(),
            page,
            limit,
            "Property search completed"
        );

        Ok(result)
    }

    /// Single listing by its prefixed id
    pub async fn property(&self, id: &str) -> Result<Option<Property>, QueryError> {
        info!(id, "Fetching single property");

        let property = self.lookup(id).await?;
        match &property {
            Some(p) => info!(id, title = %p.title, "Property found"),
            None => warn!(id, "Property not found"),
        }

        Ok(property)
    }

    /// Re-read a listing from its source. Nothing is stored, so this is a
    /// plain lookup.
    pub async fn sync_property(&self, id: &str) -> Result<Option<Property>, QueryError> {
        info!(id, "Sync property requested");

        let property = self.lookup(id).await?;
        match &property {
            Some(p) => info!(id, title = %p.title, "Property synced"),
            None => warn!(id, "Property not found for sync"),
        }

        Ok(property)
    }

    /// Countries offered to consumers
    pub fn countries(&self) -> Vec<Country> {
        reference::countries()
    }

    /// Registry of integrated listing sites
    pub fn property_sources(&self) -> Vec<PropertySource> {
        reference::property_sources()
    }

    pub fn api_status(&self) -> Vec<ApiStatus> {
        info!("Checking API status for all sources");

        let statuses = self.aggregator.get_api_status();

        info!(
            status_count = statuses.len(),
            online_count = statuses.iter().filter(|s| s.is_online).count(),
            "API status check completed"
        );

        statuses
    }

    /// No cache exists, so there is nothing to refresh; always succeeds.
    pub fn refresh_property_data(&self, source_id: Option<&str>) -> bool {
        info!(?source_id, "Refresh property data requested");
        info!("Property data refresh completed (nothing cached)");
        true
    }

    async fn lookup(&self, id: &str) -> Result<Option<Property>, QueryError> {
        let aggregator = Arc::clone(&self.aggregator);
        let owned_id = id.to_string();

        tokio::spawn(async move { aggregator.get_property(&owned_id).await })
            .await
            .map_err(|e| {
                error!(id, error = %e, "Failed to fetch property");
                QueryError::PropertyFetchFailed
            })
    }
}
