pub mod validators;

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use weekpack_core::{
    now_ts, MetadataUpdate, PackFailure, PackOptions, PackOutcome, PackPage, PageRequest,
};
use weekpack_fetch::{FetchOutcome, Fetcher};
use weekpack_parser::{normalize_text, page_title, sha256_hex, stable_pack_hash};
use weekpack_storage::{next_sunday_expiry, Storage, DEFAULT_LOCK_POLL, DEFAULT_LOCK_TIMEOUT};

pub use validators::{merge_validators, MergedValidators};

/// Orchestrates the weekly pack lifecycle for one request: cache lookup,
/// single-flight rebuild under the domain lock, metadata refresh, and the
/// conditional save.
pub struct PackCoordinator {
    storage: Storage,
    fetcher: Fetcher,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl PackCoordinator {
    pub fn new(storage: Storage, fetcher: Fetcher) -> Self {
        Self {
            storage,
            fetcher,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll: DEFAULT_LOCK_POLL,
        }
    }

    pub fn with_lock_bounds(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.lock_timeout = timeout;
        self.lock_poll = poll_interval;
        self
    }

    /// Return the live weekly pack for `domain` when one exists, otherwise
    /// rebuild it from `pages`. Per-page fetch failures are aggregated into
    /// the outcome; store failures abort the request.
    pub async fn build_or_fetch(
        &self,
        domain: &str,
        pages: &[PageRequest],
        options: &PackOptions,
    ) -> Result<PackOutcome> {
        let now = now_ts();
        self.storage.purge_expired_packs(now).await?;

        if !options.force_refresh {
            if let Some(cached) = self.storage.get_pack(domain).await? {
                debug!(domain, "pack cache hit");
                return Ok(PackOutcome::hit(cached.pages));
            }
        }

        if !self
            .storage
            .acquire_domain_lock(domain, self.lock_timeout, self.lock_poll)
            .await?
        {
            warn!(domain, "gave up waiting for domain rebuild lock");
            return Ok(PackOutcome::lock_timeout(domain));
        }

        let rebuilt = self.rebuild(domain, pages, options, now).await;
        let released = self.storage.release_domain_lock(domain).await;
        let outcome = rebuilt?;
        released?;
        Ok(outcome)
    }

    async fn rebuild(
        &self,
        domain: &str,
        pages: &[PageRequest],
        options: &PackOptions,
        now: f64,
    ) -> Result<PackOutcome> {
        // Another request may have rebuilt while we waited for the lock.
        if !options.force_refresh {
            if let Some(cached) = self.storage.get_pack(domain).await? {
                debug!(domain, "pack rebuilt while waiting for lock");
                return Ok(PackOutcome::hit(cached.pages));
            }
        }

        let timeout = Duration::from_secs(options.timeout_s);
        let mut pack_pages: Vec<PackPage> = Vec::new();
        let mut unchanged_urls: Vec<String> = Vec::new();
        let mut errors: Vec<PackFailure> = Vec::new();
        let mut should_save_pack = !options.client_has_pack;

        for (idx, page) in pages.iter().enumerate() {
            if idx > 0 && options.rate_limit_ms > 0 {
                sleep(Duration::from_millis(options.rate_limit_ms)).await;
            }

            let meta = self.storage.get_page_metadata(domain, &page.url).await?;
            let merged = merge_validators(meta.as_ref(), page);

            let outcome = self
                .fetcher
                .fetch_page(
                    &page.url,
                    merged.etag.as_deref(),
                    merged.last_modified.as_deref(),
                    timeout,
                )
                .await;

            let (body, etag, last_modified) = match outcome {
                Ok(FetchOutcome::NotModified) => {
                    unchanged_urls.push(page.url.clone());
                    self.storage
                        .upsert_page_metadata(
                            domain,
                            &page.url,
                            &MetadataUpdate {
                                pack_hash: meta.as_ref().and_then(|m| m.pack_hash.clone()),
                                etag: merged.etag.clone(),
                                last_modified: merged.last_modified.clone(),
                                text_hash: merged.text_hash.clone(),
                                last_checked_at: now,
                            },
                        )
                        .await?;

                    if options.client_has_pack {
                        // Origin confirmed unchanged and the client already
                        // holds the body; nothing to rebuild for this page.
                        should_save_pack = false;
                        continue;
                    }

                    // No shared pack exists, so the body is still needed.
                    match self.fetcher.fetch_page(&page.url, None, None, timeout).await {
                        Ok(FetchOutcome::Fetched {
                            body,
                            etag,
                            last_modified,
                        }) => (body, etag, last_modified),
                        Ok(FetchOutcome::NotModified) => {
                            errors.push(PackFailure::new(&page.url, "HTTP 304"));
                            continue;
                        }
                        Err(e) => {
                            errors.push(PackFailure::new(&page.url, e.to_string()));
                            continue;
                        }
                    }
                }
                Ok(FetchOutcome::Fetched {
                    body,
                    etag,
                    last_modified,
                }) => (body, etag, last_modified),
                Err(e) => {
                    errors.push(PackFailure::new(&page.url, e.to_string()));
                    continue;
                }
            };

            let title = page_title(&body);
            let normalized_text = normalize_text(&body);
            let text_hash = sha256_hex(&normalized_text);
            let fetched_at = now_ts();

            // Content-equivalent even though the origin did not answer 304.
            if merged.text_hash.as_deref() == Some(text_hash.as_str()) {
                unchanged_urls.push(page.url.clone());
            }

            pack_pages.push(PackPage {
                url: page.url.clone(),
                title,
                normalized_text,
                text_hash,
                etag,
                last_modified,
                fetched_at,
            });
        }

        let pack_hash = stable_pack_hash(&pack_pages);
        let expires_at = next_sunday_expiry(now);

        for page in &pack_pages {
            self.storage
                .upsert_page_metadata(
                    domain,
                    &page.url,
                    &MetadataUpdate {
                        pack_hash: Some(pack_hash.clone()),
                        etag: page.etag.clone(),
                        last_modified: page.last_modified.clone(),
                        text_hash: Some(page.text_hash.clone()),
                        last_checked_at: now,
                    },
                )
                .await?;
        }

        if should_save_pack && !pack_pages.is_empty() {
            self.storage
                .save_pack(domain, &pack_pages, &pack_hash, now, expires_at)
                .await?;
            info!(domain, pages = pack_pages.len(), "saved weekly pack");
        }

        Ok(PackOutcome {
            cache_hit: false,
            pages: pack_pages,
            unchanged_urls,
            errors,
        })
    }
}
