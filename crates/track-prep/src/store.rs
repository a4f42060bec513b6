//! Session cache for the prepared table.
//!
//! A dashboard process prepares the table once and serves every view from
//! the same immutable copy. [`TrackStore`] holds that copy behind a
//! `parking_lot::RwLock`; readers share an `Arc` and never block each other.
//! Invalidation is explicit through [`TrackStore::reload`] or
//! [`TrackStore::clear`].

use crate::config::PrepConfig;
use crate::error::{PrepError, Result};
use crate::insights::TrackFilter;
use crate::pipeline::Pipeline;
use crate::types::PreparedTracks;
use parking_lot::RwLock;
use polars::prelude::DataFrame;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TrackStore {
    pipeline: Pipeline,
    prepared: RwLock<Option<Arc<PreparedTracks>>>,
}

static_assertions::assert_impl_all!(TrackStore: Send, Sync);

impl TrackStore {
    /// Store that prepares tables with `pipeline`. Nothing is loaded yet.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            prepared: RwLock::new(None),
        }
    }

    /// Store over a default pipeline for `config`.
    pub fn from_config(config: PrepConfig) -> Result<Self> {
        Ok(Self::new(Pipeline::builder().config(config).build()?))
    }

    pub fn config(&self) -> &PrepConfig {
        self.pipeline.config()
    }

    pub fn is_loaded(&self) -> bool {
        self.prepared.read().is_some()
    }

    /// The cached table, or [`PrepError::NoDataLoaded`].
    pub fn loaded(&self) -> Result<Arc<PreparedTracks>> {
        self.prepared.read().clone().ok_or(PrepError::NoDataLoaded)
    }

    /// The cached table, preparing it first if the cache is empty.
    ///
    /// A failed load leaves the cache empty so the next call retries.
    pub fn get_or_load(&self) -> Result<Arc<PreparedTracks>> {
        if let Some(prepared) = self.prepared.read().as_ref() {
            debug!("Serving cached table ({} rows)", prepared.height());
            return Ok(Arc::clone(prepared));
        }

        let mut slot = self.prepared.write();
        // Another caller may have loaded while we waited for the write lock.
        if let Some(prepared) = slot.as_ref() {
            return Ok(Arc::clone(prepared));
        }

        let prepared = Arc::new(self.pipeline.prepare()?);
        info!("Cached prepared table: {} rows", prepared.height());
        *slot = Some(Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Prepare the table again and replace the cached copy.
    ///
    /// On failure the previous copy, if any, stays in place.
    pub fn reload(&self) -> Result<Arc<PreparedTracks>> {
        let prepared = Arc::new(self.pipeline.prepare()?);
        info!("Reloaded prepared table: {} rows", prepared.height());
        *self.prepared.write() = Some(Arc::clone(&prepared));
        Ok(prepared)
    }

    pub fn clear(&self) {
        *self.prepared.write() = None;
        debug!("Cleared cached table");
    }

    /// Rows of the cached table that pass `filter`, loading it if needed.
    pub fn filtered(&self, filter: &TrackFilter) -> Result<DataFrame> {
        let prepared = self.get_or_load()?;
        filter.apply(&prepared.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const HEADER: &str = "index,track_id,artists,album_name,track_name,popularity,duration_ms,explicit,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,time_signature,track_genre";

    fn write_source(path: &Path, rows: &[&str]) {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content.push('\n');
        fs::write(path, content).unwrap();
    }

    fn rows() -> Vec<&'static str> {
        vec![
            "0,a1,Artist A,Album,Song A,73,230666,False,0.676,0.461,1,-6.746,0,0.143,0.0322,0.00000101,0.358,0.715,87.917,4,acoustic",
            "1,b2,Artist B,Album,Song B,25,149610,False,0.42,0.166,1,-17.235,1,0.0763,0.924,0.00000556,0.101,0.267,77.489,4,jazz",
        ]
    }

    #[test]
    fn test_get_or_load_caches_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        write_source(&path, &rows());

        let store = TrackStore::from_config(PrepConfig::single(&path)).unwrap();
        assert!(!store.is_loaded());
        assert_eq!(store.loaded().unwrap_err().error_code(), "NO_DATA_LOADED");

        let first = store.get_or_load().unwrap();
        assert_eq!(first.height(), 2);

        // The source changes but the cache is still served.
        write_source(&path, &rows()[..1]);
        let second = store.get_or_load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let reloaded = store.reload().unwrap();
        assert_eq!(reloaded.height(), 1);

        store.clear();
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.csv");

        let store = TrackStore::from_config(PrepConfig::single(&path)).unwrap();
        assert_eq!(store.get_or_load().unwrap_err().error_code(), "SOURCE_LOAD_FAILED");
        assert!(!store.is_loaded());

        write_source(&path, &rows());
        assert_eq!(store.get_or_load().unwrap().height(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        write_source(&path, &rows());

        let store = TrackStore::from_config(PrepConfig::single(&path)).unwrap();
        store.get_or_load().unwrap();

        fs::remove_file(&path).unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.loaded().unwrap().height(), 2);
    }

    #[test]
    fn test_filtered_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.csv");
        write_source(&path, &rows());

        let store = TrackStore::from_config(PrepConfig::single(&path)).unwrap();
        let jazz = store.filtered(&TrackFilter::new().genre("jazz")).unwrap();
        assert_eq!(jazz.height(), 1);
        assert!(store.is_loaded());
    }
}
