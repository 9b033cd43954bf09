// ============================================================================
// Freshness Manager - when to rebuild, and only one rebuild at a time
// ============================================================================
//
// The active generation lives behind a `GenerationHandle`. Readers clone
// the `Arc<Generation>` out of it and release the lock immediately, so a
// rebuild never blocks a query; the swap after a successful build is a
// single write.
//
// A rebuild runs in its own task owned by the manager, never inside a
// caller's future. Callers that find the store stale either start that
// task or join the one already running, and all of them share its
// outcome. Dropping a caller never stops the build.
//
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};

use crate::config::{FreshnessConfig, StoreConfig};
use crate::error::{EngineError, Result};
use crate::models::generation::StoreStatus;
use crate::services::parsers::{OrangeBookParser, PurpleBookParser};
use crate::services::source_fetcher::{DataSource, OrangeBookRaw, PurpleBookRaw};
use crate::services::store_builder::{
    new_generation_id, Generation, ParsedDatasets, StoreBuilder, StoreLayout,
};

/// The one piece of shared mutable state: which generation is being served
#[derive(Debug, Default)]
pub struct GenerationHandle {
    active: RwLock<Option<Arc<Generation>>>,
}

impl GenerationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<Generation>> {
        self.active.read().await.clone()
    }

    /// Serve `generation` from now on; returns the one it replaced
    pub async fn swap(&self, generation: Arc<Generation>) -> Option<Arc<Generation>> {
        self.active.write().await.replace(generation)
    }
}

#[derive(Debug, Clone)]
struct FailureRecord {
    message: String,
    at: Instant,
}

type BuildOutcome = std::result::Result<(), Arc<EngineError>>;
type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

/// The build task currently owned by the manager
struct InFlightBuild {
    finished: Arc<AtomicBool>,
    outcome: SharedBuild,
}

impl InFlightBuild {
    fn is_running(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }
}

/// Marks the build finished when the task ends, panics or is cancelled
struct FinishedOnDrop(Arc<AtomicBool>);

impl Drop for FinishedOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

enum BuildTicket {
    Started(SharedBuild),
    Joined(SharedBuild),
}

pub struct FreshnessManager {
    source: Arc<dyn DataSource>,
    layout: StoreLayout,
    builder: StoreBuilder,
    config: FreshnessConfig,
    handle: Arc<GenerationHandle>,
    in_flight: Mutex<Option<InFlightBuild>>,
    /// Generations swapped out; their files stay while anyone still holds them
    retired: Mutex<Vec<Weak<Generation>>>,
    last_failure: RwLock<Option<FailureRecord>>,
}

impl FreshnessManager {
    /// Open the store in `store.data_dir`, picking up the generation named by
    /// ACTIVE when it is readable. Nothing is fetched here.
    pub async fn open(
        source: Arc<dyn DataSource>,
        store: &StoreConfig,
        config: FreshnessConfig,
    ) -> Result<Self> {
        let layout = StoreLayout::new(&store.data_dir);
        layout.ensure_dirs().await?;

        let handle = Arc::new(GenerationHandle::new());
        let active_id = layout.read_active_pointer().await?;

        let mut keep = None;
        if let Some(id) = active_id {
            let path = layout.generation_path(&id);
            match Generation::open(&path, store.read_pool_size).await {
                Ok(generation) => {
                    tracing::info!(
                        "Serving generation {} ({}) built at {}",
                        generation.id(),
                        generation.metadata.version_tag,
                        generation.metadata.built_at
                    );
                    handle.swap(Arc::new(generation)).await;
                    keep = Some(id);
                }
                Err(e) => {
                    tracing::warn!("Active generation {} is unreadable, will rebuild: {}", id, e);
                }
            }
        }

        let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
        let removed = layout.sweep(&keep).await?;
        if removed > 0 {
            tracing::info!("Removed {} leftover generation files", removed);
        }

        Ok(Self {
            source,
            builder: StoreBuilder::new(layout.clone(), store.read_pool_size),
            layout,
            config,
            handle,
            in_flight: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
            last_failure: RwLock::new(None),
        })
    }

    pub fn handle(&self) -> Arc<GenerationHandle> {
        self.handle.clone()
    }

    /// Make sure a usable generation is active, building one if none exists
    /// or the active one is stale. Waits for the build; concurrent callers
    /// share a single one.
    pub async fn ensure_ready(self: &Arc<Self>) -> Result<()> {
        let ticket = match self.start_or_join().await {
            Some(BuildTicket::Started(build)) | Some(BuildTicket::Joined(build)) => build,
            None => return Ok(()),
        };

        let Err(e) = ticket.await else {
            return Ok(());
        };
        if self.handle.current().await.is_some() {
            tracing::debug!("Serving previous generation after failed rebuild: {}", e);
            return Ok(());
        }
        Err(EngineError::from_shared(e))
    }

    /// What queries call. With a generation to serve, a stale store is
    /// refreshed in the background and the caller goes straight on; only an
    /// empty store makes the caller wait for a build.
    pub async fn ready_for_reads(self: &Arc<Self>) -> Result<()> {
        if self.handle.current().await.is_none() {
            return self.ensure_ready().await;
        }
        if let Some(BuildTicket::Started(_)) = self.start_or_join().await {
            tracing::info!("Active generation is stale, refreshing in the background");
        }
        Ok(())
    }

    /// Rebuild now regardless of age. Waits for any build already running,
    /// then runs one of its own and reports its outcome.
    pub async fn force_rebuild(self: &Arc<Self>) -> Result<()> {
        loop {
            let build = {
                let mut in_flight = self.in_flight.lock().await;
                let running = in_flight
                    .as_ref()
                    .filter(|b| b.is_running())
                    .map(|b| b.outcome.clone());
                match running {
                    Some(running) => BuildTicket::Joined(running),
                    None => BuildTicket::Started(self.spawn_build(&mut in_flight)),
                }
            };

            match build {
                BuildTicket::Joined(running) => {
                    let _ = running.await;
                }
                BuildTicket::Started(own) => return own.await.map_err(EngineError::from_shared),
            }
        }
    }

    pub async fn status(&self) -> StoreStatus {
        let now = Utc::now();
        let active = self.handle.current().await;
        let last_failure = self.last_failure.read().await.clone();
        let rebuild_in_progress = self
            .in_flight
            .lock()
            .await
            .as_ref()
            .map(InFlightBuild::is_running)
            .unwrap_or(false);

        StoreStatus {
            age_days: active.as_ref().map(|g| g.metadata.age_days(now)),
            is_stale: active
                .as_ref()
                .map(|g| g.metadata.is_stale(now, self.config.max_age_days))
                .unwrap_or(true),
            active_generation: active.map(|g| g.metadata.clone()),
            rebuild_in_progress,
            last_rebuild_error: last_failure.map(|f| f.message),
        }
    }

    /// Join the running build, or start one if the store needs it.
    /// Decided under the in-flight lock so one staleness episode gets one build.
    async fn start_or_join(self: &Arc<Self>) -> Option<BuildTicket> {
        let mut in_flight = self.in_flight.lock().await;

        if let Some(running) = in_flight.as_ref().filter(|b| b.is_running()) {
            return Some(BuildTicket::Joined(running.outcome.clone()));
        }
        if !self.needs_rebuild().await {
            return None;
        }

        Some(BuildTicket::Started(self.spawn_build(&mut in_flight)))
    }

    fn spawn_build(self: &Arc<Self>, in_flight: &mut Option<InFlightBuild>) -> SharedBuild {
        let finished = Arc::new(AtomicBool::new(false));
        let marker = FinishedOnDrop(finished.clone());
        let manager = Arc::clone(self);

        let task = tokio::spawn(async move {
            let _finished = marker;
            manager.run_build().await
        });

        let outcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Arc::new(EngineError::Internal(anyhow::anyhow!(
                    "build task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlightBuild {
            finished,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run_build(&self) -> BuildOutcome {
        match self.rebuild().await {
            Ok(()) => {
                *self.last_failure.write().await = None;
                Ok(())
            }
            Err(e) => {
                *self.last_failure.write().await = Some(FailureRecord {
                    message: e.to_string(),
                    at: Instant::now(),
                });

                match self.handle.current().await {
                    Some(previous) => tracing::warn!(
                        "Rebuild failed, continuing to serve generation {} ({}): {}",
                        previous.id(),
                        previous.metadata.version_tag,
                        e
                    ),
                    None => tracing::error!("Initial build failed and no generation is available: {}", e),
                }
                Err(Arc::new(e))
            }
        }
    }

    async fn needs_rebuild(&self) -> bool {
        let Some(active) = self.handle.current().await else {
            return true;
        };
        if !active.metadata.is_stale(Utc::now(), self.config.max_age_days) {
            return false;
        }

        // Stale but serving: don't hammer the source after a recent failure
        let cooldown = Duration::from_secs(self.config.retry_cooldown_secs);
        match self.last_failure.read().await.as_ref() {
            Some(failure) => failure.at.elapsed() >= cooldown,
            None => true,
        }
    }

    /// Fetch, parse, build, then swap. Only ever runs inside the build task.
    async fn rebuild(&self) -> Result<()> {
        let started = Instant::now();
        tracing::info!("Rebuilding regulatory data store");

        let (orange_raw, purple_raw) = tokio::try_join!(
            self.source.fetch_orange_book(),
            self.source.fetch_purple_book()
        )?;
        tracing::info!("Source datasets acquired in {}ms", started.elapsed().as_millis());

        let datasets = tokio::task::spawn_blocking(move || parse_datasets(&orange_raw, &purple_raw))
            .await
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("parser task failed: {}", e)))??;

        let generation_id = new_generation_id();
        let generation = Arc::new(self.builder.build(&generation_id, &datasets).await?);

        if let Err(e) = self.layout.write_active_pointer(&generation_id).await {
            generation.close().await;
            let _ = tokio::fs::remove_file(generation.path()).await;
            return Err(EngineError::Build(format!("Could not record active generation: {}", e)));
        }

        let previous = self.handle.swap(generation).await;
        tracing::info!(
            "Generation {} is now active (rebuild took {}ms)",
            generation_id,
            started.elapsed().as_millis()
        );

        if let Err(e) = self.sweep_retired(&generation_id, previous).await {
            tracing::warn!("Could not clean up old generations: {}", e);
        }

        Ok(())
    }

    /// Remove generation files nobody can reach any more. The generation
    /// just replaced always stays until the next swap, and so does any
    /// older one a reader still holds.
    async fn sweep_retired(&self, active_id: &str, previous: Option<Arc<Generation>>) -> Result<usize> {
        let mut retired = self.retired.lock().await;
        if let Some(previous) = &previous {
            retired.push(Arc::downgrade(previous));
        }

        let held: Vec<Arc<Generation>> = retired.iter().filter_map(Weak::upgrade).collect();
        retired.retain(|g| g.strong_count() > 0);

        let mut keep = vec![active_id];
        keep.extend(held.iter().map(|g| g.id()));
        if let Some(previous) = &previous {
            keep.push(previous.id());
        }

        self.layout.sweep(&keep).await
    }
}

/// Parse both raw datasets into rows ready for a build
pub fn parse_datasets(orange: &OrangeBookRaw, purple: &PurpleBookRaw) -> Result<ParsedDatasets> {
    let orange_book = OrangeBookParser::parse(orange)?;
    let purple_book = PurpleBookParser::parse(purple)?;

    Ok(ParsedDatasets {
        orange_book,
        purple_book,
        orange_book_source_date: orange.source_date,
        purple_book_month: Some(purple.month_label()),
        orange_book_sha256: Some(orange.sha256.clone()),
        purple_book_sha256: Some(purple.sha256.clone()),
    })
}

/// Background refresh on a fixed interval
pub struct FreshnessScheduler {
    manager: Arc<FreshnessManager>,
    interval_hours: u64,
}

impl FreshnessScheduler {
    pub fn new(manager: Arc<FreshnessManager>, interval_hours: u64) -> Self {
        Self {
            manager,
            interval_hours: interval_hours.max(1),
        }
    }

    /// Run the scheduler loop
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.interval_hours * 3600);
        let mut ticker = tokio::time::interval(interval);

        // Skip first tick (runs immediately on start)
        ticker.tick().await;

        tracing::info!(
            "Freshness scheduler started - checking every {} hours",
            self.interval_hours
        );

        loop {
            ticker.tick().await;
            self.run_scheduled_check().await;
        }
    }

    pub async fn run_scheduled_check(&self) {
        tracing::info!("Running scheduled freshness check...");

        if let Err(e) = self.manager.ensure_ready().await {
            tracing::error!("Scheduled freshness check failed: {}", e);
        }
    }
}
