//! Serializes a finalized payload into the attribution link URL.

use crate::config::LinksConfig;
use crate::error::ConfigError;
use crate::payload::{FieldValue, Payload};
use url::Url;

/// Formats payloads as `<scheme>://<host>/?<query>`.
///
/// Fields are emitted in payload order; list values repeat their key once per
/// element. Formatting is pure: equal payloads always yield equal URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFormatter {
    base: Url,
}

impl LinkFormatter {
    /// Formatter for `scheme://host/`.
    pub fn new(scheme: &str, host: &str) -> Result<Self, ConfigError> {
        if scheme.is_empty() || host.is_empty() {
            return Err(ConfigError::ValidationError(
                "link scheme and host must not be empty".to_string(),
            ));
        }
        let base = Url::parse(&format!("{scheme}://{host}/")).map_err(|e| {
            ConfigError::ValidationError(format!("invalid link base {scheme}://{host}/: {e}"))
        })?;
        Ok(Self { base })
    }

    pub fn from_config(links: &LinksConfig) -> Result<Self, ConfigError> {
        Self::new(&links.scheme, &links.host)
    }

    #[must_use]
    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    #[must_use]
    pub fn format(&self, payload: &Payload) -> String {
        let pairs = query_pairs(payload);
        let mut url = self.base.clone();
        if !pairs.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url.into()
    }
}

fn query_pairs(payload: &Payload) -> Vec<(&str, String)> {
    let mut pairs = Vec::with_capacity(payload.len());
    for (key, value) in payload.iter() {
        match value {
            FieldValue::List(items) => {
                pairs.extend(items.iter().map(|item| (key, item.clone())));
            }
            scalar => pairs.push((key, scalar.as_scalar().unwrap_or_default())),
        }
    }
    pairs
}
