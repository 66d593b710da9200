use crate::models::{Property, PropertySearchFilters};
use crate::reference;
use async_trait::async_trait;

/// Common trait for all listing-site clients
///
/// Implementations contain their own failures: `search` and `get_property`
/// log what went wrong and return an empty or absent result, so one broken
/// site never takes down a whole query.
#[async_trait]
pub trait PropertyClient: Send + Sync {
    /// Name of the listing site, also used for logging and status reports
    fn name(&self) -> &'static str;

    /// Primary country of the listing site
    fn country(&self) -> &'static str;

    /// Whether the site publishes listings for the upper-cased country code
    fn supports_country(&self, country_code: &str) -> bool {
        self.country() == country_code
            || reference::supported_countries(self.name())
                .iter()
                .any(|code| *code == country_code)
    }

    /// True when the credentials this client needs are configured
    fn is_available(&self) -> bool;

    /// Search the site. Never fails; errors yield an empty list.
    async fn search(&self, filters: &PropertySearchFilters, page: u32, limit: u32) -> Vec<Property>;

    /// Fetch one listing by its prefixed id. Never fails; errors yield `None`.
    async fn get_property(&self, id: &str) -> Option<Property>;
}
