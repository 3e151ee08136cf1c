//! Streaming tile downloads.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

use super::checksum::calculate_file_checksum;
use super::repair::{apply_repairs, SinusoidalSphereRepair, TileRepair};
use super::staging::StagingArea;
use super::{DownloadError, DownloadResult};
use crate::fetch::FetchedTile;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Called after each tile with `(tiles_done, tiles_total, tile_bytes)`.
pub type ProgressCallback = Box<dyn Fn(usize, usize, u64) + Send + Sync>;

/// Opens a byte stream for a download URL.
pub trait DownloadClient: Send + Sync {
    fn open(&self, url: &str) -> DownloadResult<Box<dyn Read + Send>>;
}

/// Blocking reqwest download client.
#[derive(Debug, Clone)]
pub struct ReqwestDownloadClient {
    client: Client,
    timeout: Option<Duration>,
}

impl Default for ReqwestDownloadClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
            timeout: None,
        }
    }
}

impl ReqwestDownloadClient {
    /// Client with reqwest's default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with a custom timeout. `0` keeps reqwest's default.
    pub fn with_timeout(timeout_secs: u64) -> DownloadResult<Self> {
        if timeout_secs == 0 {
            return Ok(Self::default());
        }

        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::DownloadFailed {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout: Some(timeout),
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl DownloadClient for ReqwestDownloadClient {
    fn open(&self, url: &str) -> DownloadResult<Box<dyn Read + Send>> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                }
            } else {
                DownloadError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        Ok(Box::new(response))
    }
}

/// A tile written to the staging directory. Also the manifest entry
/// returned with the merged raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedTile {
    pub index: usize,
    pub row: u32,
    pub col: u32,
    pub path: PathBuf,
    pub bytes: u64,
    /// SHA-256 of the file as it will be merged (after repairs).
    pub sha256: String,
}

/// Downloads fetched tiles into a staging area.
pub struct TileDownloader<'a> {
    client: &'a dyn DownloadClient,
    repairs: Vec<Box<dyn TileRepair>>,
}

impl<'a> TileDownloader<'a> {
    /// Downloader with no repair hooks.
    pub fn new(client: &'a dyn DownloadClient) -> Self {
        Self {
            client,
            repairs: Vec::new(),
        }
    }

    /// Adds the repairs known to be needed for supported products.
    pub fn with_standard_repairs(self) -> Self {
        self.with_repair(Box::new(SinusoidalSphereRepair::default()))
    }

    pub fn with_repair(mut self, repair: Box<dyn TileRepair>) -> Self {
        self.repairs.push(repair);
        self
    }

    pub fn repair_names(&self) -> Vec<&'static str> {
        self.repairs.iter().map(|r| r.name()).collect()
    }

    /// Downloads every tile in order, stopping at the first failure.
    pub fn download_all(
        &self,
        staging: &StagingArea,
        tiles: &[FetchedTile],
        progress: Option<&ProgressCallback>,
    ) -> DownloadResult<Vec<DownloadedTile>> {
        let mut downloaded = Vec::with_capacity(tiles.len());

        for tile in tiles {
            let result = self.download_one(staging, tile)?;
            if let Some(cb) = progress {
                cb(downloaded.len() + 1, tiles.len(), result.bytes);
            }
            downloaded.push(result);
        }

        Ok(downloaded)
    }

    /// Streams one tile to its staging path, then repairs and fingerprints it.
    pub fn download_one(
        &self,
        staging: &StagingArea,
        tile: &FetchedTile,
    ) -> DownloadResult<DownloadedTile> {
        let path = staging.tile_path(tile.tile.index);
        let mut reader = self.client.open(&tile.url)?;

        let file = File::create(&path).map_err(|e| DownloadError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut bytes = 0u64;

        loop {
            let bytes_read =
                reader
                    .read(&mut buffer)
                    .map_err(|e| DownloadError::DownloadFailed {
                        url: tile.url.clone(),
                        reason: format!("read error: {}", e),
                    })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| DownloadError::WriteFailed {
                    path: path.clone(),
                    source: e,
                })?;

            bytes += bytes_read as u64;
        }

        writer.flush().map_err(|e| DownloadError::WriteFailed {
            path: path.clone(),
            source: e,
        })?;
        drop(writer);

        if bytes == 0 {
            return Err(DownloadError::EmptyFile {
                url: tile.url.clone(),
                path,
            });
        }

        let applied = apply_repairs(&path, &self.repairs)?;
        let bytes = if applied.is_empty() {
            bytes
        } else {
            std::fs::metadata(&path)
                .map(|m| m.len())
                .map_err(|e| DownloadError::ReadFailed {
                    path: path.clone(),
                    source: e,
                })?
        };
        let sha256 = calculate_file_checksum(&path)?;

        debug!(
            tile = tile.tile.index,
            row = tile.tile.row,
            col = tile.tile.col,
            bytes,
            path = %path.display(),
            "Tile downloaded"
        );

        Ok(DownloadedTile {
            index: tile.tile.index,
            row: tile.tile.row,
            col: tile.tile.col,
            path,
            bytes,
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::MockDownloadClient;
    use crate::download::{OutputLayout, RunTag};
    use crate::export::TileRef;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fetched(index: usize, url: &str) -> FetchedTile {
        FetchedTile {
            tile: TileRef {
                index,
                row: (index / 2) as u32,
                col: (index % 2) as u32,
            },
            url: url.to_string(),
        }
    }

    fn staging(temp: &TempDir) -> StagingArea {
        StagingArea::prepare(&OutputLayout::new(temp.path()), "job", RunTag::new("r1")).unwrap()
    }

    #[test]
    fn test_client_default_timeout() {
        assert!(ReqwestDownloadClient::new().timeout().is_none());
        assert!(ReqwestDownloadClient::with_timeout(0).unwrap().timeout().is_none());
        assert_eq!(
            ReqwestDownloadClient::with_timeout(60).unwrap().timeout(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_download_all_writes_deterministic_paths() {
        let temp = TempDir::new().unwrap();
        let staging = staging(&temp);
        let client = MockDownloadClient::new()
            .with_body("http://t/0", b"tile zero".to_vec())
            .with_body("http://t/1", vec![7u8; 150_000]);

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let progress: ProgressCallback = Box::new(move |done, total, _| {
            assert_eq!(total, 2);
            seen.store(done, Ordering::SeqCst);
        });

        let tiles = TileDownloader::new(&client)
            .download_all(
                &staging,
                &[fetched(0, "http://t/0"), fetched(1, "http://t/1")],
                Some(&progress),
            )
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tiles[0].path.file_name().unwrap(), "job_r1_tile_00.tif");
        assert_eq!(tiles[1].bytes, 150_000);
        assert_eq!((tiles[1].row, tiles[1].col), (0, 1));
        assert_eq!(std::fs::read(&tiles[0].path).unwrap(), b"tile zero");
        assert_eq!(tiles[0].sha256.len(), 64);
    }

    #[test]
    fn test_empty_download_is_rejected() {
        let temp = TempDir::new().unwrap();
        let staging = staging(&temp);
        let client = MockDownloadClient::new().with_body("http://t/0", Vec::new());

        let err = TileDownloader::new(&client)
            .download_one(&staging, &fetched(0, "http://t/0"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::EmptyFile { .. }));
    }

    #[test]
    fn test_failure_aborts_and_keeps_earlier_tiles() {
        let temp = TempDir::new().unwrap();
        let staging = staging(&temp);
        let client = MockDownloadClient::new().with_body("http://t/0", b"ok".to_vec());

        let err = TileDownloader::new(&client)
            .download_all(
                &staging,
                &[
                    fetched(0, "http://t/0"),
                    fetched(1, "http://t/missing"),
                    fetched(2, "http://t/0"),
                ],
                None,
            )
            .unwrap_err();

        assert!(matches!(err, DownloadError::DownloadFailed { .. }));
        assert!(staging.tile_path(0).exists());
        assert!(!staging.tile_path(2).exists());
        assert_eq!(client.requested(), vec!["http://t/0", "http://t/missing"]);
    }

    #[test]
    fn test_standard_repairs_reject_non_tiff() {
        let temp = TempDir::new().unwrap();
        let staging = staging(&temp);
        let client = MockDownloadClient::new().with_body("http://t/0", b"<html/>".to_vec());

        let downloader = TileDownloader::new(&client).with_standard_repairs();
        assert_eq!(downloader.repair_names(), vec!["sinusoidal-sphere"]);

        let err = downloader
            .download_one(&staging, &fetched(0, "http://t/0"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidRaster { .. }));
    }
}
