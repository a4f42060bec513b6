//! Trait for external music catalogues that can answer release-date queries.

use anyhow::Result;

/// A catalogue that maps a track id to the release date of its album.
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// by the CLI and a session cache.
///
/// # Error Handling
///
/// Implementations return whatever went wrong via `anyhow::Result`. Callers
/// go through [`lookup_release_date`](super::lookup_release_date), which
/// turns every failure into [`ReleaseDateLookup::Unknown`](super::ReleaseDateLookup).
pub trait CatalogueLookup: Send + Sync {
    /// Raw release-date string for `track_id`, in whatever precision the
    /// catalogue stores (`"1999"`, `"1999-04"`, `"1999-04-12"`).
    fn release_date(&self, track_id: &str) -> Result<String>;

    /// Name of the catalogue, for logs and reports.
    fn name(&self) -> &str;
}
