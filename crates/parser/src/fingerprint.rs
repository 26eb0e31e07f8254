use sha2::{Digest, Sha256};

use weekpack_core::PackPage;

/// SHA-256 over the UTF-8 bytes of `text`, as lowercase hex.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic pack fingerprint over the sorted `(url, text_hash)` multiset.
/// Volatile fields (fetch time, headers, title) never contribute, so packs
/// built from identical content hash identically regardless of page order.
pub fn stable_pack_hash(pages: &[PackPage]) -> String {
    let mut rows: Vec<(&str, &str)> = pages
        .iter()
        .map(|p| (p.url.as_str(), p.text_hash.as_str()))
        .collect();
    rows.sort_unstable();

    let mut hasher = Sha256::new();
    for (url, text_hash) in rows {
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(text_hash.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, text: &str, fetched_at: f64) -> PackPage {
        PackPage {
            url: url.to_string(),
            title: format!("title of {url}"),
            normalized_text: text.to_string(),
            text_hash: sha256_hex(text),
            etag: None,
            last_modified: None,
            fetched_at,
        }
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("Hello world"),
            "64ec88ca00b268e5ba1a35678a1b5316d212f4f366b2477232534a8aecb09e85"
        );
    }

    #[test]
    fn pack_hash_ignores_page_order() {
        let a = page("http://example.org/a", "alpha", 1.0);
        let b = page("http://example.org/b", "beta", 2.0);
        let c = page("http://example.org/c", "gamma", 3.0);
        let forward = stable_pack_hash(&[a.clone(), b.clone(), c.clone()]);
        let shuffled = stable_pack_hash(&[c, a, b]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn pack_hash_ignores_volatile_fields() {
        let mut early = page("http://example.org/a", "alpha", 1.0);
        let mut late = page("http://example.org/a", "alpha", 999.0);
        early.etag = Some("\"v1\"".into());
        late.title = "renamed".into();
        assert_eq!(stable_pack_hash(&[early]), stable_pack_hash(&[late]));
    }

    #[test]
    fn pack_hash_tracks_content_changes() {
        let before = page("http://example.org/a", "alpha", 1.0);
        let after = page("http://example.org/a", "alpha2", 1.0);
        assert_ne!(stable_pack_hash(&[before]), stable_pack_hash(&[after]));
    }

    #[test]
    fn empty_pack_hashes_consistently() {
        assert_eq!(stable_pack_hash(&[]), stable_pack_hash(&[]));
    }
}
