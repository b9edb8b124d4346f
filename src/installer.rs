//! Reconciles a resolved pack with an install directory.
//!
//! An install run moves through these phases, each finishing completely
//! before the next one starts:
//!
//! 1. Load the snapshot of the previous successful install
//! 2. Filter the pack by side and diff it against the snapshot
//! 3. Re-check every unchanged file on disk, queueing broken ones for download
//! 4. Download and write new or broken files
//! 5. Delete files that left the pack
//! 6. Persist the new snapshot
//!
//! Within a phase, files are processed concurrently. The first failure
//! cancels the rest of the phase and aborts the run before the snapshot is
//! written, so a later run re-derives everything from disk.

use crate::diff::diff;
use crate::error::{InstallError, Result};
use crate::fetch::{fetch_valid_bytes, Fetcher, HttpFetcher};
use crate::hash::{hash_file, ExpectedHash, HashFormat};
use crate::provider::{CurseForgeClient, ProviderResolver};
use crate::resolver::resolve_pack;
use crate::snapshot::SnapshotStore;
use crate::types::{Download, InstallConfig, Pack, PackFile, Side, Updates};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Resolves the pack at `url` and installs it into `root`.
///
/// This is the main entry point. It wires the HTTP fetcher and the CurseForge
/// client from `config`, resolves the manifest chain, and runs the installer.
///
/// # Example
///
/// ```no_run
/// use packsync::{install_pack, InstallConfig, Side};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InstallConfig::default();
/// let url = "https://example.com/pack/pack.toml".parse()?;
/// let updates = install_pack(&config, url, None, ".minecraft", Side::Client).await?;
/// println!("{}", updates);
/// # Ok(())
/// # }
/// ```
pub async fn install_pack(
    config: &InstallConfig,
    url: Url,
    pack_hash: Option<ExpectedHash>,
    root: impl Into<PathBuf>,
    side: Side,
) -> Result<Updates> {
    let http = HttpFetcher::new(config)?;
    let provider = Arc::new(CurseForgeClient::new(http.client().clone(), config));
    let fetcher: Arc<dyn Fetcher> = Arc::new(http);

    let pack = resolve_pack(url, pack_hash, Arc::clone(&fetcher), config).await?;
    LocalInstaller::new(pack, root, side, fetcher, provider, config)?
        .with_progress(true)
        .install()
        .await
}

/// State shared by every task of a run.
struct Context {
    root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    provider: Arc<dyn ProviderResolver>,
}

/// Work queued for the remaining phases and results collected so far.
///
/// One lock guards both; tasks hold it only to push a finished file.
#[derive(Default)]
struct Ledger {
    plan: Updates,
    done: Updates,
}

/// Installs and updates a pack in a local directory.
pub struct LocalInstaller {
    ctx: Arc<Context>,
    pack: Pack,
    side: Side,
    snapshot: SnapshotStore,
    max_concurrent_tasks: usize,
    progress: bool,
}

impl LocalInstaller {
    /// Creates an installer for `pack` rooted at `root`.
    ///
    /// `root` is made absolute against the current directory. `side` must be
    /// client, server or both.
    pub fn new(
        pack: Pack,
        root: impl Into<PathBuf>,
        side: Side,
        fetcher: Arc<dyn Fetcher>,
        provider: Arc<dyn ProviderResolver>,
        config: &InstallConfig,
    ) -> Result<Self> {
        if side == Side::Unspecified {
            return Err(InstallError::InvalidSide(side.to_string()));
        }

        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map_err(|e| InstallError::io("resolve", &root, e))?
                .join(root)
        };

        Ok(Self {
            snapshot: SnapshotStore::new(&root, &config.state_dir),
            ctx: Arc::new(Context {
                root,
                fetcher,
                provider,
            }),
            pack,
            side,
            max_concurrent_tasks: config.max_concurrent_tasks.max(1),
            progress: false,
        })
    }

    /// Shows a progress bar during the download phase.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.ctx.root
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// Files of the pack that belong on this installer's side.
    fn wanted_files(&self) -> Vec<PackFile> {
        self.pack
            .files
            .iter()
            .filter(|file| self.side.should_install(file.side))
            .cloned()
            .collect()
    }

    /// Diffs the pack against the last snapshot without touching the disk.
    pub async fn plan(&self) -> Result<Updates> {
        let installed = self.snapshot.load().await?;
        Ok(diff(&installed, &self.wanted_files()))
    }

    /// Runs a full reconciliation pass.
    ///
    /// Returns what was downloaded, removed, and left in place. The snapshot
    /// is only updated when every phase succeeds.
    pub async fn install(&self) -> Result<Updates> {
        let started = Instant::now();
        info!(
            "Installing pack {:?} {} into {} (side: {})",
            self.pack.name,
            self.pack.version,
            self.ctx.root.display(),
            self.side
        );

        let wanted = self.wanted_files();
        let installed = self.snapshot.load().await?;
        let plan = diff(&installed, &wanted);
        info!(
            "Planned {} new, {} removed, {} to verify",
            plan.added.len(),
            plan.removed.len(),
            plan.unchanged.len()
        );

        let ledger = Arc::new(Mutex::new(Ledger {
            plan,
            done: Updates::default(),
        }));
        let cancel = CancellationToken::new();

        // Integrity: anything missing or damaged on disk goes back to the download queue.
        let to_verify = std::mem::take(&mut ledger.lock().plan.unchanged);
        self.run_phase("integrity", to_verify, &cancel, None, {
            let ctx = Arc::clone(&self.ctx);
            let ledger = Arc::clone(&ledger);
            move |file| {
                let ctx = Arc::clone(&ctx);
                let ledger = Arc::clone(&ledger);
                async move {
                    let intact = ctx.check_integrity(&file).await?;
                    {
                        let mut ledger = ledger.lock();
                        if intact {
                            ledger.done.unchanged.push(file);
                        } else {
                            ledger.plan.added.push(file);
                        }
                    }
                    Ok::<(), InstallError>(())
                }
            }
        })
        .await?;

        // Download
        let to_download = std::mem::take(&mut ledger.lock().plan.added);
        let pb = self.progress_bar(to_download.len());
        self.run_phase("download", to_download, &cancel, pb.as_ref(), {
            let ctx = Arc::clone(&self.ctx);
            let ledger = Arc::clone(&ledger);
            move |file| {
                let ctx = Arc::clone(&ctx);
                let ledger = Arc::clone(&ledger);
                async move {
                    ctx.install_file(&file).await?;
                    ledger.lock().done.added.push(file);
                    Ok::<(), InstallError>(())
                }
            }
        })
        .await
        .inspect_err(|_| {
            if let Some(pb) = &pb {
                pb.abandon_with_message("❌ Download failed!");
            }
        })?;
        if let Some(pb) = &pb {
            pb.finish_with_message("✅ Downloads complete");
        }

        // Removal. A path that is still wanted was re-added with a new hash
        // in the download phase and must stay on disk.
        let wanted_paths: Arc<HashSet<String>> =
            Arc::new(wanted.iter().map(|file| file.path.clone()).collect());
        let to_remove = std::mem::take(&mut ledger.lock().plan.removed);
        self.run_phase("removal", to_remove, &cancel, None, {
            let ctx = Arc::clone(&self.ctx);
            let ledger = Arc::clone(&ledger);
            move |file| {
                let ctx = Arc::clone(&ctx);
                let ledger = Arc::clone(&ledger);
                let wanted_paths = Arc::clone(&wanted_paths);
                async move {
                    if !wanted_paths.contains(&file.path) {
                        ctx.remove_file(&file).await?;
                    }
                    ledger.lock().done.removed.push(file);
                    Ok::<(), InstallError>(())
                }
            }
        })
        .await?;

        let result = std::mem::take(&mut ledger.lock().done);
        let mut new_snapshot = result.unchanged.clone();
        new_snapshot.extend(result.added.iter().cloned());
        self.snapshot.save(&new_snapshot).await?;

        info!(
            "✅ Installed in {}: {} added, {} removed, {} unchanged",
            humantime::format_duration(whole_millis(started.elapsed())),
            result.added.len(),
            result.removed.len(),
            result.unchanged.len()
        );
        Ok(result)
    }

    fn progress_bar(&self, len: usize) -> Option<indicatif::ProgressBar> {
        if !self.progress || len == 0 {
            return None;
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}")
                .map(|style| style.progress_chars("█▓▒░ "))
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
        );
        pb.set_message(format!("📦 Downloading {} files", len));
        Some(pb)
    }

    /// Runs `task` for every file with bounded concurrency.
    ///
    /// The first error cancels the remaining tasks and is returned; errors
    /// from tasks cancelled as a consequence are not reported.
    async fn run_phase<F, Fut>(
        &self,
        phase: &'static str,
        files: Vec<PackFile>,
        cancel: &CancellationToken,
        pb: Option<&indicatif::ProgressBar>,
        task: F,
    ) -> Result<()>
    where
        F: Fn(PackFile) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if files.is_empty() {
            return Ok(());
        }
        debug!("Starting {} phase for {} files", phase, files.len());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let mut tasks = JoinSet::new();

        for file in files {
            let path = file.path.clone();
            let work = task(file);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let pb = pb.cloned();

            tasks.spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(InstallError::Cancelled),
                    result = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| InstallError::Cancelled)?;
                        if let Some(pb) = &pb {
                            pb.set_message(format!("| ⬇️  {}", path));
                        }
                        work.await
                    } => result,
                };
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                result
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| InstallError::TaskFailed(format!("{} task: {}", phase, e)))
                .and_then(|result| result);
            if let Err(e) = outcome {
                error!("{} phase failed: {}", phase, e);
                cancel.cancel();
                tasks.shutdown().await;
                return Err(e);
            }
        }

        debug!("Finished {} phase", phase);
        Ok(())
    }
}

/// Drops sub-millisecond precision so durations log as e.g. `1s 234ms`.
fn whole_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

impl Context {
    fn local_path(&self, file: &PackFile) -> PathBuf {
        self.root.join(&file.path)
    }

    /// Whether the file on disk still matches its recorded hash.
    async fn check_integrity(&self, file: &PackFile) -> Result<bool> {
        if file.hash.is_empty() {
            return Err(InstallError::EmptyExpectedHash(file.hash_format.clone()));
        }
        let format: HashFormat = file.hash_format.parse()?;
        let path = self.local_path(file);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Missing {}, queued for download", file.path);
                return Ok(false);
            }
            Err(e) => return Err(InstallError::io("stat", &path, e)),
        };
        if metadata.is_dir() {
            warn!("A directory occupies {}, queued for download", file.path);
            return Ok(false);
        }

        match hash_file(&path, format).await {
            Ok(actual) if actual.eq_ignore_ascii_case(&file.hash) => {
                debug!("✅ {} verified", file.path);
                Ok(true)
            }
            Ok(actual) => {
                info!(
                    "❌ Hash mismatch for {}: expected {}, got {}",
                    file.path, file.hash, actual
                );
                Ok(false)
            }
            Err(InstallError::Io { op, source, .. }) => {
                warn!("⚠️  Failed to {} {}: {}", op, file.path, source);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Downloads, verifies and writes a single file.
    async fn install_file(&self, file: &PackFile) -> Result<()> {
        let url = match &file.download {
            Download::Url { url } => url.clone(),
            Download::CurseForge(reference) => self.provider.download_url(reference).await?,
        };

        let data =
            fetch_valid_bytes(self.fetcher.as_ref(), &url, &file.hash_format, &file.hash).await?;

        let path = self.local_path(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallError::io("create directory", parent, e))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| InstallError::io("write", &path, e))?;

        info!("⬇️  Installed {} ({} bytes)", file.path, data.len());
        Ok(())
    }

    /// Deletes a file that left the pack; an already missing file is fine.
    async fn remove_file(&self, file: &PackFile) -> Result<()> {
        let path = self.local_path(file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️  Removed {}", file.path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already absent", file.path);
                Ok(())
            }
            Err(e) => Err(InstallError::io("remove", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryFetcher, MemoryResolver};
    use crate::types::CurseForgeRef;
    use tempfile::TempDir;

    fn file(path: &str, body: &[u8], side: Side) -> PackFile {
        PackFile {
            path: path.to_string(),
            hash: HashFormat::Sha1.digest(body),
            hash_format: "sha1".to_string(),
            side,
            download: Download::Url {
                url: format!("https://cdn.test/{}", path),
            },
        }
    }

    fn installer(
        temp: &TempDir,
        files: Vec<PackFile>,
        side: Side,
        fetcher: MemoryFetcher,
        resolver: MemoryResolver,
    ) -> LocalInstaller {
        let pack = Pack {
            name: "Test".to_string(),
            files,
            ..Pack::default()
        };
        let config = InstallConfig {
            max_concurrent_tasks: 3,
            ..InstallConfig::default()
        };
        LocalInstaller::new(
            pack,
            temp.path(),
            side,
            Arc::new(fetcher),
            Arc::new(resolver),
            &config,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_unspecified_target_side() {
        let temp = TempDir::new().unwrap();
        let result = LocalInstaller::new(
            Pack::default(),
            temp.path(),
            Side::Unspecified,
            Arc::new(MemoryFetcher::new()),
            Arc::new(MemoryResolver::default()),
            &InstallConfig::default(),
        );
        assert!(matches!(result, Err(InstallError::InvalidSide(_))));
    }

    #[tokio::test]
    async fn test_side_filter_skips_other_side() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            file("mods/client.jar", b"client", Side::Client),
            file("mods/server.jar", b"server", Side::Server),
            file("mods/common.jar", b"common", Side::Unspecified),
        ];
        let fetcher = MemoryFetcher::new()
            .with("https://cdn.test/mods/client.jar", b"client")
            .with("https://cdn.test/mods/common.jar", b"common");

        let inst = installer(&temp, files, Side::Client, fetcher, MemoryResolver::default());
        let updates = inst.install().await.unwrap();

        let mut added: Vec<_> = updates.added.iter().map(|f| f.path.as_str()).collect();
        added.sort_unstable();
        assert_eq!(added, ["mods/client.jar", "mods/common.jar"]);
        assert!(!temp.path().join("mods/server.jar").exists());
    }

    #[tokio::test]
    async fn test_curseforge_file_goes_through_resolver() {
        let temp = TempDir::new().unwrap();
        let reference = CurseForgeRef {
            project_id: 238222,
            file_id: 4712345,
        };
        let mut jei = file("mods/jei.jar", b"jei bytes", Side::Both);
        jei.download = Download::CurseForge(reference);

        let fetcher = MemoryFetcher::new().with("https://edge.test/jei.jar", b"jei bytes");
        let resolver = MemoryResolver::default().with(reference, "https://edge.test/jei.jar");

        let inst = installer(&temp, vec![jei], Side::Both, fetcher, resolver);
        inst.install().await.unwrap();
        assert_eq!(
            std::fs::read(temp.path().join("mods/jei.jar")).unwrap(),
            b"jei bytes"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_without_snapshot() {
        let temp = TempDir::new().unwrap();
        let mut jei = file("mods/jei.jar", b"jei bytes", Side::Both);
        jei.download = Download::CurseForge(CurseForgeRef {
            project_id: 1,
            file_id: 1,
        });

        let inst = installer(
            &temp,
            vec![jei],
            Side::Both,
            MemoryFetcher::new(),
            MemoryResolver::default(),
        );
        let result = inst.install().await;
        assert!(matches!(result, Err(InstallError::ProviderLookupFailed { .. })));
        assert!(!inst.snapshot().path().exists());
    }

    #[tokio::test]
    async fn test_directory_in_place_of_file_is_requeued() {
        let temp = TempDir::new().unwrap();
        let a = file("mods/a.jar", b"a", Side::Both);
        let store = SnapshotStore::new(temp.path(), ".packsync");
        store.save(std::slice::from_ref(&a)).await.unwrap();
        std::fs::create_dir_all(temp.path().join("mods/a.jar")).unwrap();

        let fetcher = MemoryFetcher::new().with("https://cdn.test/mods/a.jar", b"a");
        let inst = installer(&temp, vec![a], Side::Both, fetcher, MemoryResolver::default());

        // Queued for download, but the write cannot replace a directory.
        let result = inst.install().await;
        assert!(matches!(result, Err(InstallError::Io { op: "write", .. })));
        assert_eq!(
            inst.snapshot().load().await.unwrap()[0].hash,
            HashFormat::Sha1.digest(b"a")
        );
    }

    #[tokio::test]
    async fn test_hash_change_keeps_new_file() {
        let temp = TempDir::new().unwrap();
        let old = file("mods/a.jar", b"v1", Side::Both);
        let new = file("mods/a.jar", b"v2", Side::Both);
        std::fs::create_dir_all(temp.path().join("mods")).unwrap();
        std::fs::write(temp.path().join("mods/a.jar"), b"v1").unwrap();
        SnapshotStore::new(temp.path(), ".packsync")
            .save(&[old])
            .await
            .unwrap();

        let fetcher = MemoryFetcher::new().with("https://cdn.test/mods/a.jar", b"v2");
        let inst = installer(&temp, vec![new], Side::Both, fetcher, MemoryResolver::default());
        let updates = inst.install().await.unwrap();

        assert_eq!(updates.added.len(), 1);
        assert_eq!(updates.removed.len(), 1);
        assert!(updates.unchanged.is_empty());
        assert_eq!(std::fs::read(temp.path().join("mods/a.jar")).unwrap(), b"v2");

        let snapshot = inst.snapshot().load().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].hash, HashFormat::Sha1.digest(b"v2"));
    }

    #[tokio::test]
    async fn test_plan_does_not_touch_disk() {
        let temp = TempDir::new().unwrap();
        let inst = installer(
            &temp,
            vec![file("mods/a.jar", b"a", Side::Both)],
            Side::Both,
            MemoryFetcher::new(),
            MemoryResolver::default(),
        );
        let plan = inst.plan().await.unwrap();
        assert_eq!(plan.added.len(), 1);
        assert!(!temp.path().join("mods").exists());
        assert!(!inst.snapshot().path().exists());
    }

    #[tokio::test]
    async fn test_first_failure_cancels_stalled_downloads() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            file("mods/slow1.jar", b"slow1", Side::Both),
            file("mods/slow2.jar", b"slow2", Side::Both),
            file("mods/bad.jar", b"bad", Side::Both),
        ];
        let fetcher = MemoryFetcher::new()
            .stalled("https://cdn.test/mods/slow1.jar")
            .stalled("https://cdn.test/mods/slow2.jar");

        let inst = installer(&temp, files, Side::Both, fetcher, MemoryResolver::default());
        let result = tokio::time::timeout(Duration::from_secs(5), inst.install())
            .await
            .expect("install should not wait for stalled downloads");

        match result {
            Err(InstallError::HttpStatus { url, .. }) => {
                assert_eq!(url, "https://cdn.test/mods/bad.jar")
            }
            other => panic!("Expected HttpStatus for bad.jar, got {:?}", other),
        }
        assert!(!inst.snapshot().path().exists());
    }

    #[test]
    fn test_elapsed_time_is_logged_in_whole_millis() {
        let elapsed = whole_millis(Duration::new(1, 234_567_890));
        assert_eq!(elapsed, Duration::from_millis(1234));
        assert_eq!(humantime::format_duration(elapsed).to_string(), "1s 234ms");
        assert_eq!(whole_millis(Duration::MAX), Duration::from_millis(u64::MAX));
    }
}
