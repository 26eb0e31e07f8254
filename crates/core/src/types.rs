use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Durable per-(domain, url) record of the validators seen on the last fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub domain: String,
    pub url: String,
    pub pack_hash: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub text_hash: Option<String>,
    pub last_checked_at: Option<f64>,
    pub updated_at: f64,
}

/// Fields written by a metadata upsert. `updated_at` is stamped by the store.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub pack_hash: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub text_hash: Option<String>,
    pub last_checked_at: f64,
}

/// One normalized page inside a weekly pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackPage {
    pub url: String,
    pub title: String,
    pub normalized_text: String,
    pub text_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub fetched_at: f64,
}

/// A weekly pack as read back from the shared store.
#[derive(Debug, Clone)]
pub struct StoredPack {
    pub domain: String,
    pub pages: Vec<PackPage>,
    pub pack_hash: String,
    pub fetched_at: f64,
    pub expires_at: f64,
}

/// One page entry from the client request, with optional prior validators.
/// `last_checked` is accepted for wire compatibility and never consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub url: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub last_text_hash: Option<String>,
    #[serde(default)]
    pub last_checked: Option<f64>,
}

/// A per-page (or per-domain, for lock timeouts) failure surfaced to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackFailure {
    pub url: String,
    pub error: String,
}

impl PackFailure {
    pub fn new(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: error.into(),
        }
    }
}

/// Typed rebuild options decoded from the request's loose `options` bag.
#[derive(Debug, Clone, PartialEq)]
pub struct PackOptions {
    pub rate_limit_ms: u64,
    pub timeout_s: u64,
    pub force_refresh: bool,
    pub client_has_pack: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            rate_limit_ms: 0,
            timeout_s: 30,
            force_refresh: false,
            client_has_pack: false,
        }
    }
}

impl PackOptions {
    /// Decode the dynamic options object. Unknown keys are ignored;
    /// missing or wrong-typed keys take the defaults.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(map) = value.as_object() else {
            return defaults;
        };
        Self {
            rate_limit_ms: map
                .get("rate_limit_ms")
                .and_then(Value::as_u64)
                .unwrap_or(defaults.rate_limit_ms),
            timeout_s: map
                .get("timeout_s")
                .and_then(Value::as_u64)
                .filter(|&t| t >= 1)
                .unwrap_or(defaults.timeout_s),
            force_refresh: map
                .get("force_refresh")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.force_refresh),
            client_has_pack: map
                .get("client_has_pack")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.client_has_pack),
        }
    }
}

/// Result of one BuildOrFetchPack call.
#[derive(Debug, Default)]
pub struct PackOutcome {
    pub cache_hit: bool,
    pub pages: Vec<PackPage>,
    pub unchanged_urls: Vec<String>,
    pub errors: Vec<PackFailure>,
}

impl PackOutcome {
    pub fn hit(pages: Vec<PackPage>) -> Self {
        Self {
            cache_hit: true,
            pages,
            ..Default::default()
        }
    }

    pub fn lock_timeout(domain: &str) -> Self {
        Self {
            errors: vec![PackFailure::new(
                domain,
                "Timed out waiting for domain rebuild lock",
            )],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_default_on_empty_bag() {
        let opts = PackOptions::from_value(&json!({}));
        assert_eq!(opts, PackOptions::default());
    }

    #[test]
    fn options_default_on_non_object() {
        assert_eq!(PackOptions::from_value(&Value::Null), PackOptions::default());
        assert_eq!(
            PackOptions::from_value(&json!("fast")),
            PackOptions::default()
        );
    }

    #[test]
    fn options_decode_known_keys() {
        let opts = PackOptions::from_value(&json!({
            "rate_limit_ms": 250,
            "timeout_s": 5,
            "force_refresh": true,
            "client_has_pack": true,
        }));
        assert_eq!(opts.rate_limit_ms, 250);
        assert_eq!(opts.timeout_s, 5);
        assert!(opts.force_refresh);
        assert!(opts.client_has_pack);
    }

    #[test]
    fn options_ignore_unknown_and_wrong_typed_keys() {
        let opts = PackOptions::from_value(&json!({
            "rate_limit_ms": "soon",
            "timeout_s": 0,
            "force_refresh": "yes",
            "parallelism": 8,
        }));
        assert_eq!(opts, PackOptions::default());
    }

    #[test]
    fn page_request_accepts_minimal_entry() {
        let page: PageRequest =
            serde_json::from_value(json!({ "url": "http://example.org/a" })).unwrap();
        assert_eq!(page.url, "http://example.org/a");
        assert!(page.etag.is_none());
        assert!(page.last_checked.is_none());
    }

    #[test]
    fn pack_page_roundtrips_without_validators() {
        let page = PackPage {
            url: "http://example.org/a".into(),
            title: String::new(),
            normalized_text: "hello".into(),
            text_hash: "abc".into(),
            etag: None,
            last_modified: None,
            fetched_at: 1.0,
        };
        let encoded = serde_json::to_string(&page).unwrap();
        assert!(!encoded.contains("etag"));
        let decoded: PackPage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, page);
    }
}
