//! Path status resolution
//!
//! Classifies a key as file, directory or nothing by issuing the probes of a
//! [`ProbeSet`] in a fixed order:
//!
//! 1. HEAD of the key itself (skipped for keys ending in `/`)
//! 2. HEAD of the directory marker `key/` (skipped when emptiness is needed)
//! 3. LIST below `key/`, one entry or two when emptiness is needed
//!
//! The first probe that finds something wins. A missing key is not an error
//! here; any other store failure is returned as-is.

use tracing::debug;

use crate::error::Result;
use crate::path::dir_key;
use crate::probe::{Probe, ProbeSet};
use crate::status::{DirEmptiness, PathStatus};
use crate::traits::{ListRequest, ListResult, ObjectStore};

/// Resolve the status of `key`
///
/// The empty key is the root and is always an empty directory, no request is
/// made for it.
///
/// # Panics
///
/// When `need_empty` is set but `probes` does not contain [`Probe::List`].
pub async fn resolve_key(
    store: &dyn ObjectStore,
    key: &str,
    probes: ProbeSet,
    need_empty: bool,
) -> Result<PathStatus> {
    assert!(
        !need_empty || probes.contains(Probe::List),
        "emptiness of {key:?} requested without a LIST probe ({probes:?})"
    );

    if key.is_empty() {
        return Ok(PathStatus::directory(DirEmptiness::Empty));
    }

    if probes.contains(Probe::Head) && !key.ends_with('/') {
        match store.head_object(key).await {
            Ok(meta) => {
                debug!(key, size = meta.size, "Resolved as file");
                return Ok(PathStatus::File {
                    size: meta.size,
                    last_modified: meta.last_modified,
                });
            }
            Err(e) if e.is_not_found() => debug!(key, "No object at key"),
            Err(e) => return Err(e),
        }
    }

    let dir = dir_key(key);

    if probes.contains(Probe::DirMarker) && !need_empty {
        match store.head_object(&dir).await {
            Ok(meta) => {
                debug!(key = %dir, "Resolved by directory marker");
                return Ok(PathStatus::Directory {
                    emptiness: DirEmptiness::Unknown,
                    last_modified: meta.last_modified,
                });
            }
            Err(e) if e.is_not_found() => debug!(key = %dir, "No directory marker"),
            Err(e) => return Err(e),
        }
    }

    if probes.contains(Probe::List) {
        let wanted = if need_empty { 2 } else { 1 };
        let listing = list_children(store, &dir, wanted).await?;
        if listing.entry_count() > 0 {
            let emptiness = if !need_empty {
                DirEmptiness::Unknown
            } else if holds_only_marker(&listing, &dir) {
                DirEmptiness::Empty
            } else {
                DirEmptiness::NotEmpty
            };
            debug!(key = %dir, entries = listing.entry_count(), ?emptiness, "Resolved by listing");
            return Ok(PathStatus::directory(emptiness));
        }
    }

    debug!(key, ?probes, "Nothing found");
    Ok(PathStatus::NotFound)
}

/// LIST below `dir` until `wanted` entries are collected or the listing ends
async fn list_children(store: &dyn ObjectStore, dir: &str, wanted: usize) -> Result<ListResult> {
    let request = ListRequest::shallow(dir, wanted as i32);
    let mut listing = store.list_objects(&request).await?;
    while listing.truncated && listing.entry_count() < wanted {
        if listing.continuation_token.is_none() {
            debug!(prefix = dir, "Truncated listing without continuation token");
            break;
        }
        let next = store.list_objects(&request.continue_from(&listing)).await?;
        listing.absorb(next);
    }
    Ok(listing)
}

/// A directory whose listing shows nothing but its own marker is empty
fn holds_only_marker(listing: &ListResult, dir: &str) -> bool {
    listing.common_prefixes.is_empty() && listing.objects.iter().all(|o| o.key == dir)
}
