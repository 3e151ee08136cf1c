//! Sequential submission of export requests.

use std::fmt;

use tracing::{debug, info};

use crate::backend::{BackendError, ComputeBackend};
use crate::export::{ExportRequest, TileRef};

/// A backend failure tagged with the tile that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    pub row: u32,
    pub col: u32,
    pub source: BackendError,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile (row {}, col {}): {}", self.row, self.col, self.source)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Download URL for one exported tile.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTile {
    pub tile: TileRef,
    pub url: String,
}

/// Submits export requests one after another.
pub struct TileFetcher<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> TileFetcher<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Self { backend }
    }

    /// Exports every request in order. The first failure aborts the batch;
    /// nothing is retried.
    pub fn fetch_all(&self, requests: &[ExportRequest]) -> Result<Vec<FetchedTile>, FetchError> {
        let mut fetched = Vec::with_capacity(requests.len());

        for request in requests {
            let url = self.backend.export(request).map_err(|source| FetchError {
                row: request.tile.row,
                col: request.tile.col,
                source,
            })?;

            debug!(
                tile = request.tile.index,
                row = request.tile.row,
                col = request.tile.col,
                "Export ready"
            );

            fetched.push(FetchedTile {
                tile: request.tile,
                url,
            });
        }

        info!(tiles = fetched.len(), "Fetched export URLs");
        Ok(fetched)
    }
}
