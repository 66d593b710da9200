use euro_immo::models::PropertySearchFilters;
use euro_immo::{Config, PropertyAggregator, PropertyQueries, SearchRequest};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    info!("🏠 EuroImmo - Property Aggregator");
    info!("==================================");

    let aggregator = Arc::new(PropertyAggregator::from_config(&config)?);
    let queries = PropertyQueries::new(aggregator);

    for status in queries.api_status() {
        let state = if status.is_online { "online" } else { "not configured" };
        info!("{}: {}", status.source, state);
    }

    // Usage: euro-immo [COUNTRY] [CITY]
    let mut args = std::env::args().skip(1);
    let filters = PropertySearchFilters {
        country: args.next(),
        city: args.next(),
        ..Default::default()
    };

    info!("Searching with filters: {:?}", filters);

    let result = queries
        .properties(SearchRequest {
            filters,
            ..Default::default()
        })
        .await?;

    info!(
        "\n✅ Found {} properties ({} on this page)\n",
        result.total_count,
        result.properties.len()
    );

    for (i, property) in result.properties.iter().enumerate() {
        println!("{}. {} ({} {})", i + 1, property.title, property.price, property.currency);
        println!("   {}, {}", property.address.city, property.address.country);
        if let Some(bedrooms) = property.bedrooms {
            println!("   {} bedrooms", bedrooms);
        }
        println!("   ID: {}", property.id);
        println!("   Source: {}", property.source.name);
        println!("   Features: {}", property.features.join(", "));
        println!("   URL: {}", property.url);
        println!();
    }

    let json = serde_json::to_string_pretty(&result)?;
    tokio::fs::write("search_results.json", json).await?;
    info!("💾 Saved results to search_results.json");

    Ok(())
}
