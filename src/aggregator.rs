use crate::clients::{DaftClient, IdealistaClient, ImmoScout24Client, PropertyClient};
use crate::config::Config;
use crate::models::{ApiStatus, Property, PropertySearchFilters, SearchResult};
use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fans a query out to every relevant listing site and merges the answers.
///
/// The client list is fixed at construction and the aggregator keeps no
/// state between calls.
pub struct PropertyAggregator {
    clients: Vec<Arc<dyn PropertyClient>>,
}

impl PropertyAggregator {
    /// Clients are consulted in the given order by `get_property`
    pub fn new(clients: Vec<Arc<dyn PropertyClient>>) -> Self {
        Self { clients }
    }

    /// Wire up every integrated listing site
    pub fn from_config(config: &Config) -> Result<Self> {
        let clients: Vec<Arc<dyn PropertyClient>> = vec![
            Arc::new(ImmoScout24Client::from_config(config)?),
            Arc::new(IdealistaClient::from_config(config)?),
            Arc::new(DaftClient::from_config(config)?),
        ];

        Ok(Self::new(clients))
    }

    /// Search all relevant sites concurrently, then dedupe, sort newest
    /// first and cut out the requested 1-indexed page.
    ///
    /// Each site is asked for the same `page` and `limit`, and the merged
    /// list is paged again. Page 1 is exact; later pages only contain what
    /// the sites returned beyond the first `(page - 1) * limit` merged
    /// listings, so with a single site page 2 comes back empty.
    pub async fn search(&self, filters: &PropertySearchFilters, page: u32, limit: u32) -> SearchResult {
        let page = page.max(1);
        let clients = self.relevant_clients(filters);

        if clients.is_empty() {
            warn!(?filters, "No configured source covers this search");
            return SearchResult::empty(page);
        }

        info!(clients = clients.len(), ?filters, page, limit, "Searching properties");

        let (names, tasks): (Vec<_>, Vec<_>) = clients
            .into_iter()
            .map(|client| {
                let filters = filters.clone();
                let name = client.name();
                let task = tokio::spawn(async move { client.search(&filters, page, limit).await });
                (name, task)
            })
            .unzip();

        // Wait for every site; one failing never cancels the others
        let results = join_all(tasks).await;

        let mut properties = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(found) => {
                    info!(source = name, count = found.len(), "Source search finished");
                    properties.extend(found);
                }
                Err(e) => {
                    error!(source = name, error = %e, "Source search task failed");
                }
            }
        }

        let mut unique = deduplicate(properties);
        sort_newest_first(&mut unique);
        paginate(unique, page, limit)
    }

    /// Look a property up in each site in turn; the first hit wins.
    pub async fn get_property(&self, id: &str) -> Option<Property> {
        for client in &self.clients {
            let name = client.name();
            let client = Arc::clone(client);
            let owned_id = id.to_string();

            match tokio::spawn(async move { client.get_property(&owned_id).await }).await {
                Ok(Some(property)) => {
                    debug!(source = name, id, "Property found");
                    return Some(property);
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(source = name, error = %e, id, "Property lookup task failed");
                }
            }
        }

        None
    }

    /// Credential-based availability of each site, not a live check
    pub fn get_api_status(&self) -> Vec<ApiStatus> {
        self.clients
            .iter()
            .map(|client| ApiStatus {
                source: client.name().to_string(),
                is_online: client.is_available(),
                last_checked: Utc::now(),
                rate_limit_remaining: None,
                rate_limit_reset: None,
            })
            .collect()
    }

    fn relevant_clients(&self, filters: &PropertySearchFilters) -> Vec<Arc<dyn PropertyClient>> {
        let country = filters.country_code();

        self.clients
            .iter()
            .filter(|client| client.is_available())
            .filter(|client| match country.as_deref() {
                Some(code) => client.supports_country(code),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Drop listings whose lower-cased URL was already seen, keeping the first
fn deduplicate(properties: Vec<Property>) -> Vec<Property> {
    let mut seen = HashSet::new();
    properties
        .into_iter()
        .filter(|property| seen.insert(property.dedup_key()))
        .collect()
}

/// Stable sort by `date_added`, newest first
fn sort_newest_first(properties: &mut [Property]) {
    properties.sort_by(|a, b| b.date_added.cmp(&a.date_added));
}

fn paginate(properties: Vec<Property>, page: u32, limit: u32) -> SearchResult {
    let total_count = properties.len();
    let offset = (page.max(1) as usize - 1).saturating_mul(limit as usize);
    let end = offset.saturating_add(limit as usize);

    let page_items = properties
        .into_iter()
        .skip(offset)
        .take(limit as usize)
        .collect();

    SearchResult {
        properties: page_items,
        total_count,
        has_next_page: end < total_count,
        has_previous_page: page > 1,
    }
}
