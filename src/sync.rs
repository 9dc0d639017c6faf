//! Drives a full synchronisation: count, stream items, lay out directories,
//! download every asset, then retry once for collections whose pre-signed
//! URLs expired mid-run.
use crate::catalog::CatalogItem;
use crate::download::Downloader;
use crate::error::SyncError;
use crate::naming::{prepare_download, sanitize_title};
use crate::progress::{ProgressObserver, Silent};
use crate::search::Catalog;
use crate::settings::Settings;
use futures_util::TryStreamExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    CountingResults,
    Streaming,
    Downloading,
    Done,
}

/// Outcome of one pass over the catalogue.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub downloaded: Vec<PathBuf>,
    /// Collections with at least one expired download URL, in sorted order.
    pub pending_retry: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub downloaded: Vec<PathBuf>,
    /// Collections that still failed after the retry pass.
    pub unresolved: Vec<String>,
}

pub struct Synchronizer<'a, C> {
    settings: &'a Settings,
    catalog: &'a C,
    downloader: Downloader,
    progress: Box<dyn ProgressObserver + 'a>,
    on_downloaded: Option<Box<dyn FnMut(&Path) + 'a>>,
    phase: SyncPhase,
    retrying: bool,
}

impl<'a, C: Catalog> Synchronizer<'a, C> {
    pub fn new(settings: &'a Settings, catalog: &'a C, downloader: Downloader) -> Self {
        Self {
            settings,
            catalog,
            downloader,
            progress: Box::new(Silent),
            on_downloaded: None,
            phase: SyncPhase::Idle,
            retrying: false,
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressObserver + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Host integration hook, called with every file the run produces.
    pub fn on_downloaded(mut self, hook: impl FnMut(&Path) + 'a) -> Self {
        self.on_downloaded = Some(Box::new(hook));
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// True once the run has moved on to its single retry pass.
    pub fn is_retry_pass(&self) -> bool {
        self.retrying
    }

    /// One pass, then at most one more restricted to the collections that hit
    /// HTTP 400. Anything still failing is reported rather than retried again.
    pub async fn run(&mut self, collection_ids: &[String]) -> Result<SyncReport, SyncError> {
        self.retrying = false;
        let first = self.download_files_in_collections(collection_ids).await?;
        let mut report = SyncReport {
            downloaded: first.downloaded,
            unresolved: vec![],
        };
        if first.pending_retry.is_empty() {
            return Ok(report);
        }

        let retry_ids: Vec<String> = first.pending_retry.into_iter().collect();
        self.retrying = true;
        info!(collections = ?retry_ids, "Retrying collections with expired download links");

        // Cached results would replay the expired URLs.
        self.catalog.invalidate(&retry_ids).await?;

        let retry = self.download_files_in_collections(&retry_ids).await?;
        report.downloaded.extend(retry.downloaded);
        report.unresolved = retry.pending_retry.into_iter().collect();
        if !report.unresolved.is_empty() {
            warn!(collections = ?report.unresolved, "Downloads still failing after retry");
        }
        Ok(report)
    }

    /// A single pass over every item matching `collection_ids`.
    pub async fn download_files_in_collections(
        &mut self,
        collection_ids: &[String],
    ) -> Result<PassOutcome, SyncError> {
        let catalog = self.catalog;
        let mut outcome = PassOutcome::default();

        self.enter(SyncPhase::CountingResults);
        let total = catalog.count(collection_ids).await?;
        info!(total, "Matching items");

        self.enter(SyncPhase::Streaming);
        let mut items = catalog.search(collection_ids);
        let mut index = 0_u64;

        while let Some(item) = items.try_next().await? {
            index += 1;
            self.enter(SyncPhase::Downloading);
            let target_dir = prepare_target_dir(self.settings.data_dir(), &item).await?;

            for (role, asset) in &item.assets {
                let (url, filename) = prepare_download(asset)?;
                let label = progress_label(index, total, &filename);

                let result = self
                    .downloader
                    .download_file(
                        &target_dir,
                        self.settings.redownload(),
                        &url,
                        &filename,
                        &label,
                        self.progress.as_mut(),
                    )
                    .await;

                match result {
                    Ok(path) => {
                        if let Some(hook) = self.on_downloaded.as_mut() {
                            hook(&path);
                        }
                        outcome.downloaded.push(path);
                    }
                    Err(err) if err.is_credential_expiry() => match &item.collection {
                        Some(collection_id) => {
                            warn!(collection = %collection_id, asset = %role, "Download link expired");
                            outcome.pending_retry.insert(collection_id.clone());
                        }
                        None => return Err(err),
                    },
                    Err(err) => return Err(err),
                }
            }
        }

        self.enter(SyncPhase::Done);
        Ok(outcome)
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!(from = ?self.phase, to = ?phase, "Sync phase");
        self.phase = phase;
    }
}

/// `data_dir/<collection title>[/<YYYY-MM>]`, created if missing.
///
/// Items without a usable collection title fall back to their collection id.
pub async fn prepare_target_dir(data_dir: &Path, item: &CatalogItem) -> Result<PathBuf, SyncError> {
    let mut dir = data_dir.to_path_buf();
    let collection_name = item
        .collection_title()
        .and_then(directory_name)
        .or_else(|| item.collection.as_deref().and_then(directory_name));
    if let Some(name) = collection_name {
        dir.push(name);
    }
    if let Some(period) = item.acquisition_period() {
        dir.push(period);
    }

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| SyncError::io(&dir, e))?;
    Ok(dir)
}

/// A single path component, or `None` if nothing usable remains. Names made only
/// of dots would resolve to `data_dir` itself or its parent.
fn directory_name(raw: &str) -> Option<String> {
    let name = sanitize_title(raw);
    if name.trim_matches('.').is_empty() {
        None
    } else {
        Some(name)
    }
}

fn progress_label(index: u64, total: u64, filename: &Path) -> String {
    if total == 0 {
        format!("[{}] {}", index, filename.display())
    } else {
        format!("[{}/{}] {}", index, total, filename.display())
    }
}
