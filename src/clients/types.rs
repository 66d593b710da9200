use crate::error::SourceError;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Images kept per listing
pub const MAX_IMAGES: usize = 10;

/// User agent sent to every listing site
pub const USER_AGENT: &str = "EuroImmo/1.0";

/// Listing APIs are inconsistent about returning one object or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// A JSON value that may arrive either as a number or as a numeric string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => leading_number(s),
        };
        value.filter(|v| v.is_finite())
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

/// Parses the numeric prefix of a string, so "350000 EUR" reads as 350000.
fn leading_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

/// Positive numeric value, treating zero and garbage as missing
pub fn positive(value: Option<&Scalar>) -> Option<f64> {
    value.and_then(Scalar::as_f64).filter(|v| *v > 0.0)
}

/// Positive whole count (rooms, bathrooms), fractional parts truncated
pub fn positive_count(value: Option<&Scalar>) -> Option<u32> {
    positive(value)
        .map(f64::trunc)
        .filter(|v| *v >= 1.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

/// Presence flag with loose truthiness: `true`, non-zero numbers,
/// non-empty strings other than "false"/"0", arrays and objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Truthy(pub bool);

impl<'de> Deserialize<'de> for Truthy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let flag = match value {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => b,
            serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            serde_json::Value::String(s) => {
                let s = s.trim();
                !s.is_empty() && !s.eq_ignore_ascii_case("false") && s != "0"
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
        };
        Ok(Truthy(flag))
    }
}

/// Clamp a requested page size to what a site accepts
pub fn clamp_limit(limit: u32, max: u32) -> u32 {
    limit.min(max)
}

/// Format a number for a query string without a trailing ".0"
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Build a "min-max" range parameter. A missing lower bound falls back to
/// `floor`; a missing upper bound leaves the range open ("min-").
pub fn range_param(min: Option<f64>, max: Option<f64>, floor: f64) -> Option<String> {
    match (min, max) {
        (None, None) => None,
        (Some(min), None) => Some(format!("{}-", format_number(min))),
        (min, Some(max)) => Some(format!(
            "{}-{}",
            format_number(min.unwrap_or(floor)),
            format_number(max)
        )),
    }
}

/// Deduplicate image URLs, primary image first, capped at `MAX_IMAGES`
pub fn collect_images<I>(primary: Option<String>, rest: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(rest)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_IMAGES)
        .collect()
}

/// Trimmed string, treating blank as missing
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Native listing ids are plain tokens of ASCII letters, digits, '-' and '_'.
/// Anything else must never reach a request path or form.
pub fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Decode listings one by one, skipping the ones that do not fit `T`
pub fn decode_each<T: DeserializeOwned>(
    source_name: &'static str,
    entries: Vec<serde_json::Value>,
) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(listing) => Some(listing),
            Err(e) => {
                warn!(source = source_name, error = %e, "Skipping unreadable listing");
                None
            }
        })
        .collect()
}

/// Parse the timestamp formats listing sites use
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Create the HTTP client a source adapter uses for all its requests
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")
}

/// Check the status and decode a JSON body
pub async fn read_json<T: DeserializeOwned>(
    source_name: &'static str,
    response: reqwest::Response,
) -> std::result::Result<T, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            source_name,
            status,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| SourceError::http(source_name, e))?;

    debug!(source = source_name, bytes = body.len(), "Received response");

    serde_json::from_str(&body).map_err(|e| SourceError::decode(source_name, e))
}
