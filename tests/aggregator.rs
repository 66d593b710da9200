use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use euro_immo::clients::{DaftClient, PropertyClient};
use euro_immo::models::{
    Address, ListingType, Property, PropertySearchFilters, PropertyType,
};
use euro_immo::reference;
use euro_immo::PropertyAggregator;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory listing site
struct FakeClient {
    name: &'static str,
    country: &'static str,
    available: bool,
    panics: bool,
    listings: Vec<Property>,
    search_calls: AtomicUsize,
}

impl FakeClient {
    fn new(name: &'static str, country: &'static str, listings: Vec<Property>) -> Self {
        Self {
            name,
            country,
            available: true,
            panics: false,
            listings,
            search_calls: AtomicUsize::new(0),
        }
    }

    fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    fn calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropertyClient for FakeClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn country(&self) -> &'static str {
        self.country
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn search(&self, _filters: &PropertySearchFilters, _page: u32, _limit: u32) -> Vec<Property> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("{} exploded", self.name);
        }
        self.listings.clone()
    }

    async fn get_property(&self, id: &str) -> Option<Property> {
        if self.panics {
            panic!("{} exploded", self.name);
        }
        self.listings.iter().find(|p| p.id == id).cloned()
    }
}

fn listing(id: &str, url: &str, age_hours: i64) -> Property {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    Property {
        id: id.to_string(),
        title: format!("Listing {}", id),
        description: None,
        price: 250000.0,
        currency: "EUR".to_string(),
        property_type: PropertyType::House,
        listing_type: ListingType::ForSale,
        bedrooms: Some(3),
        bathrooms: Some(1),
        area: Some(100.0),
        area_unit: Some("m²".to_string()),
        address: Address {
            street: None,
            city: "Somewhere".to_string(),
            region: None,
            postal_code: None,
            country: "Nowhere".to_string(),
        },
        coordinates: None,
        images: Vec::new(),
        source: reference::source("Test", "DE", "https://example.com"),
        url: url.to_string(),
        date_added: base - Duration::hours(age_hours),
        date_updated: None,
        features: Vec::new(),
        energy_class: None,
        is_active: true,
        source_id: None,
        last_synced: None,
    }
}

fn many(prefix: &str, count: usize, start_age: i64) -> Vec<Property> {
    (0..count)
        .map(|i| {
            listing(
                &format!("{}_{}", prefix, i),
                &format!("https://{}.example/{}", prefix, i),
                start_age + i as i64 * 3,
            )
        })
        .collect()
}

fn aggregator(clients: Vec<Arc<FakeClient>>) -> PropertyAggregator {
    PropertyAggregator::new(
        clients
            .into_iter()
            .map(|c| c as Arc<dyn PropertyClient>)
            .collect(),
    )
}

#[tokio::test]
async fn merges_dedupes_and_sorts_across_sources() {
    let german = Arc::new(FakeClient::new(
        "ImmoScout24",
        "DE",
        vec![
            listing("immoscout24_1", "https://shared.example/Flat", 5),
            listing("immoscout24_2", "https://de.example/2", 1),
        ],
    ));
    let irish = Arc::new(FakeClient::new(
        "Daft",
        "IE",
        vec![
            listing("daft_1", "https://SHARED.example/flat", 0),
            listing("daft_2", "https://ie.example/2", 3),
        ],
    ));

    let result = aggregator(vec![german, irish])
        .search(&PropertySearchFilters::default(), 1, 20)
        .await;

    assert_eq!(result.total_count, 3);
    let ids: Vec<_> = result.properties.iter().map(|p| p.id.as_str()).collect();
    // First-seen wins the shared URL; order is newest first
    assert_eq!(ids, vec!["immoscout24_2", "daft_2", "immoscout24_1"]);

    let keys: HashSet<_> = result.properties.iter().map(|p| p.url.to_lowercase()).collect();
    assert_eq!(keys.len(), result.properties.len());

    for pair in result.properties.windows(2) {
        assert!(pair[0].date_added >= pair[1].date_added);
    }
}

#[tokio::test]
async fn paginates_the_merged_set() {
    let a = Arc::new(FakeClient::new("ImmoScout24", "DE", many("a", 20, 0)));
    let b = Arc::new(FakeClient::new("Idealista", "ES", many("b", 15, 1)));
    let c = Arc::new(FakeClient::new("Daft", "IE", many("c", 10, 2)));
    let aggregator = aggregator(vec![a, b, c]);

    let first = aggregator
        .search(&PropertySearchFilters::default(), 1, 20)
        .await;
    assert_eq!(first.total_count, 45);
    assert_eq!(first.properties.len(), 20);
    assert!(first.has_next_page);
    assert!(!first.has_previous_page);

    let third = aggregator
        .search(&PropertySearchFilters::default(), 3, 20)
        .await;
    assert_eq!(third.properties.len(), 5);
    assert!(!third.has_next_page);
    assert!(third.has_previous_page);

    let zero = aggregator
        .search(&PropertySearchFilters::default(), 0, 20)
        .await;
    assert_eq!(zero.properties.len(), 20);
    assert!(!zero.has_previous_page);
}

#[tokio::test]
async fn unconfigured_sources_are_skipped() {
    let offline = Arc::new(
        FakeClient::new("ImmoScout24", "DE", many("offline", 5, 0)).unavailable(),
    );
    let online = Arc::new(FakeClient::new("Daft", "IE", many("online", 2, 0)));
    let aggregator = aggregator(vec![Arc::clone(&offline), Arc::clone(&online)]);

    let filters = PropertySearchFilters {
        country: Some("DE".to_string()),
        ..Default::default()
    };
    let result = aggregator.search(&filters, 1, 20).await;
    assert_eq!(result.total_count, 0);

    let result = aggregator
        .search(&PropertySearchFilters::default(), 1, 20)
        .await;
    assert_eq!(result.total_count, 2);
    assert_eq!(offline.calls(), 0);

    let statuses = aggregator.get_api_status();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].source, "ImmoScout24");
    assert!(!statuses[0].is_online);
    assert!(statuses[1].is_online);
    assert!(statuses.iter().all(|s| s.rate_limit_remaining.is_none()));
}

#[tokio::test]
async fn failing_source_does_not_affect_others() {
    let healthy_a = Arc::new(FakeClient::new("ImmoScout24", "DE", many("a", 3, 0)));
    let broken = Arc::new(FakeClient::new("Idealista", "ES", many("b", 3, 0)).panicking());
    let healthy_c = Arc::new(FakeClient::new("Daft", "IE", many("c", 2, 1)));
    let aggregator = aggregator(vec![healthy_a, Arc::clone(&broken), healthy_c]);

    let result = aggregator
        .search(&PropertySearchFilters::default(), 1, 20)
        .await;

    assert_eq!(broken.calls(), 1);
    assert_eq!(result.total_count, 5);
    assert!(result.properties.iter().all(|p| !p.id.starts_with("b_")));
}

#[tokio::test]
async fn unreachable_adapter_contributes_nothing() {
    let daft = DaftClient::new(Some("key".to_string()), std::time::Duration::from_secs(2))
        .unwrap()
        .with_base_url("http://127.0.0.1:1/v3");
    let german: Arc<dyn PropertyClient> =
        Arc::new(FakeClient::new("ImmoScout24", "DE", many("a", 4, 0)));

    let aggregator = PropertyAggregator::new(vec![german, Arc::new(daft)]);
    let result = aggregator
        .search(&PropertySearchFilters::default(), 1, 20)
        .await;

    assert_eq!(result.total_count, 4);
}

#[tokio::test]
async fn country_filter_selects_sources() {
    let german = Arc::new(FakeClient::new("ImmoScout24", "DE", many("de", 2, 0)));
    let iberian = Arc::new(FakeClient::new("Idealista", "ES", many("es", 2, 0)));
    let irish = Arc::new(FakeClient::new("Daft", "IE", many("ie", 2, 0)));
    let aggregator = aggregator(vec![
        Arc::clone(&german),
        Arc::clone(&iberian),
        Arc::clone(&irish),
    ]);

    let filters = PropertySearchFilters {
        country: Some("ie".to_string()),
        ..Default::default()
    };
    let result = aggregator.search(&filters, 1, 20).await;

    assert_eq!(result.total_count, 2);
    assert!(result.properties.iter().all(|p| p.id.starts_with("ie_")));
    assert_eq!(german.calls(), 0);
    assert_eq!(iberian.calls(), 0);
    assert_eq!(irish.calls(), 1);

    // Idealista covers Italy through the source country table
    let filters = PropertySearchFilters {
        country: Some("IT".to_string()),
        ..Default::default()
    };
    let result = aggregator.search(&filters, 1, 20).await;
    assert!(result.properties.iter().all(|p| p.id.starts_with("es_")));
    assert_eq!(iberian.calls(), 1);
}

#[tokio::test]
async fn get_property_falls_back_through_sources() {
    let first = Arc::new(FakeClient::new("ImmoScout24", "DE", many("de", 2, 0)));
    let second = Arc::new(FakeClient::new("Idealista", "ES", Vec::new()).panicking());
    let third = Arc::new(FakeClient::new(
        "Daft",
        "IE",
        vec![listing("daft_77", "https://ie.example/77", 0)],
    ));
    let aggregator = aggregator(vec![first, second, third]);

    let found = aggregator.get_property("daft_77").await.unwrap();
    assert_eq!(found.id, "daft_77");

    assert!(aggregator.get_property("daft_404").await.is_none());
}

#[tokio::test]
async fn no_sources_yields_empty_page() {
    let aggregator = PropertyAggregator::new(Vec::new());
    let result = aggregator
        .search(&PropertySearchFilters::default(), 2, 20)
        .await;

    assert!(result.properties.is_empty());
    assert_eq!(result.total_count, 0);
    assert!(!result.has_next_page);
    assert!(result.has_previous_page);
}

#[tokio::test]
async fn later_pages_are_cut_from_what_sources_returned() {
    // A single site hands back its own page 2, which the merge then skips
    let only = Arc::new(FakeClient::new("Daft", "IE", many("daft", 5, 0)));
    let aggregator = aggregator(vec![only.clone()]);

    let second = aggregator
        .search(&PropertySearchFilters::default(), 2, 20)
        .await;

    assert_eq!(only.calls(), 1);
    assert_eq!(second.total_count, 5);
    assert!(second.properties.is_empty());
    assert!(second.has_previous_page);
    assert!(!second.has_next_page);
}
