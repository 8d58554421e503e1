//! Locate the oldest day-hour that is due for compaction.
//!
//! The store lists keys in ascending lexicographic order and fragment names
//! sort by (distribution, date, hour), so the first real key under a prefix
//! is the oldest fragment there. The probe walks the listing two keys at a
//! time and stops at the first eligible one.

use crate::day::DayBatch;
use crate::fragment::{EligibilityWindow, FragmentKey};
use crate::store::{ListPage, ObjectStore, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

/// Keys requested per listing call. Two is enough to step over a folder marker.
pub const PROBE_PAGE_SIZE: i32 = 2;

/// Listing delimiter. Sub-folders under the prefix, such as the archive tree,
/// come back as a single common prefix instead of every key inside them.
pub const PROBE_DELIMITER: &str = "/";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("listing failed while probing '{prefix}': {source}")]
    Store {
        prefix: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug)]
pub enum ProbeOutcome {
    /// The earliest eligible day, seeded at the hour of its oldest fragment.
    Found(DayBatch),
    /// Nothing under the prefix is eligible.
    Exhausted,
}

/// What a single page tells the probe to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageVerdict {
    Eligible(FragmentKey),
    NextPage(String),
    Exhausted,
}

/// Judge one listing page.
///
/// Folder markers (keys ending in `/`) carry no content and are stepped over.
/// Keys that aren't fragments are skipped in favour of the next key on the
/// same page; the first eligible fragment wins.
pub fn evaluate_page(page: &ListPage, window: &EligibilityWindow) -> PageVerdict {
    let mut candidates = page
        .keys
        .iter()
        .filter(|key| {
            let marker = key.ends_with('/');
            if marker {
                debug!(key = %key, "Skipping folder marker");
            }
            !marker
        })
        .peekable();

    if candidates.peek().is_none() {
        debug!(truncated = page.is_truncated, "Page returned no fragment candidates");
    }

    for key in candidates {
        if let Some(fragment) = FragmentKey::decode(key) {
            if window.is_eligible(&fragment) {
                return PageVerdict::Eligible(fragment);
            }
        }
    }

    next_or_exhausted(page)
}

fn next_or_exhausted(page: &ListPage) -> PageVerdict {
    if !page.is_truncated {
        return PageVerdict::Exhausted;
    }

    match &page.next_continuation_token {
        Some(token) => PageVerdict::NextPage(token.clone()),
        None => {
            warn!("Listing is truncated but has no continuation token; stopping");
            PageVerdict::Exhausted
        }
    }
}

/// Walk the listing under `prefix` until an eligible fragment turns up or
/// the keyspace runs out.
pub async fn probe(
    store: &dyn ObjectStore,
    prefix: &str,
    window: &EligibilityWindow,
) -> Result<ProbeOutcome, ProbeError> {
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store
            .list_page(prefix, Some(PROBE_DELIMITER), token.as_deref(), PROBE_PAGE_SIZE)
            .await
            .map_err(|source| ProbeError::Store {
                prefix: prefix.to_string(),
                source,
            })?;
        pages += 1;

        match evaluate_page(&page, window) {
            PageVerdict::Eligible(fragment) => {
                debug!(
                    prefix = %prefix,
                    pages,
                    key = %fragment.storage_path,
                    "Found eligible fragment"
                );
                return Ok(ProbeOutcome::Found(DayBatch::from_fragment(&fragment)));
            }
            PageVerdict::NextPage(next) => {
                debug!(prefix = %prefix, pages, "Nothing eligible yet, probing next page");
                token = Some(next);
            }
            PageVerdict::Exhausted => {
                debug!(prefix = %prefix, pages, "No eligible fragments remain");
                return Ok(ProbeOutcome::Exhausted);
            }
        }
    }
}
