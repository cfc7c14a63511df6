use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::adapters::charger_http::{ChargerApi, ChargerHttpClient, FetchError};
use crate::adapters::csv_store::{CsvSnapshotStore, SnapshotStore, StoreError};
use crate::adapters::replay_file::ReplayChargerApi;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::{BuildError, SnapshotBuilder, StatusFetcher};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::models::{ChargerKey, Snapshot};
use crate::domain::reconcile::{ReconcileError, UnmatchedPolicy, reconcile};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SCHEDULER_THREAD_NAME: &str = "reconcile-scheduler";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to build snapshot: {0}")]
    Build(#[source] BuildError),
    #[error("failed to fetch status feed: {0}")]
    FetchStatus(#[source] FetchError),
    #[error("failed to reconcile status feed: {0}")]
    Reconcile(#[source] ReconcileError),
    #[error("failed to persist snapshot: {0}")]
    Persist(#[source] StoreError),
    #[error("no snapshot captured yet")]
    NoSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub info_page_size: u32,
    pub status_page_size: u32,
    pub unmatched_policy: UnmatchedPolicy,
}

impl From<&AppConfig> for MonitorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            info_page_size: config.info_page_size,
            status_page_size: config.status_page_size,
            unmatched_policy: config.unmatched_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub path: PathBuf,
    pub update_count: usize,
    pub updated_rows: Vec<usize>,
    pub unmatched: Vec<ChargerKey>,
}

/// Holds the authoritative snapshot. A cycle only replaces it once the new
/// version has been persisted.
pub struct StationMonitor<A, S, Cl> {
    api: A,
    store: S,
    clock: Cl,
    settings: MonitorSettings,
    snapshot: Option<Snapshot>,
}

impl<A, S, Cl> StationMonitor<A, S, Cl>
where
    A: ChargerApi,
    S: SnapshotStore,
    Cl: Clock,
{
    pub fn new(api: A, store: S, clock: Cl, settings: MonitorSettings) -> Self {
        Self {
            api,
            store,
            clock,
            settings,
            snapshot: None,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn capture_initial(&mut self) -> Result<PathBuf, MonitorError> {
        let captured_at = self.clock.now();
        let snapshot = SnapshotBuilder::new(&self.api, self.settings.info_page_size)
            .build(captured_at)
            .map_err(MonitorError::Build)?;

        let path = self
            .store
            .persist(&snapshot)
            .map_err(MonitorError::Persist)?;

        tracing::info!(
            records = snapshot.len(),
            captured_at = %captured_at,
            path = %path.display(),
            "initial snapshot persisted"
        );

        self.snapshot = Some(snapshot);
        Ok(path)
    }

    pub fn tick(&mut self) -> Result<CycleReport, MonitorError> {
        let current = self.snapshot.as_ref().ok_or(MonitorError::NoSnapshot)?;
        let reconciled_at = self.clock.now();

        let updates = StatusFetcher::new(&self.api, self.settings.status_page_size)
            .fetch()
            .map_err(MonitorError::FetchStatus)?;

        let result = reconcile(
            current,
            &updates,
            reconciled_at,
            self.settings.unmatched_policy,
        )
        .map_err(MonitorError::Reconcile)?;

        if !result.unmatched.is_empty() {
            tracing::warn!(
                unmatched = result.unmatched.len(),
                first = %result.unmatched[0],
                "status updates for chargers missing from the snapshot were skipped"
            );
        }

        let path = self
            .store
            .persist(&result.snapshot)
            .map_err(MonitorError::Persist)?;

        tracing::info!(
            update_count = result.update_count,
            updated_rows = ?result.updated_rows,
            path = %path.display(),
            "reconciled snapshot persisted"
        );

        let report = CycleReport {
            path,
            update_count: result.update_count,
            updated_rows: result.updated_rows,
            unmatched: result.unmatched,
        };
        self.snapshot = Some(result.snapshot);

        Ok(report)
    }
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    cycles_started: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_coalesced: AtomicU64,
}

impl SchedulerStats {
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn ticks_coalesced(&self) -> u64 {
        self.ticks_coalesced.load(Ordering::Relaxed)
    }
}

pub struct SchedulerHandle {
    stop_flag: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Blocks until the loop exits. An in-flight cycle always completes first.
    pub fn join(self) -> thread::Result<()> {
        self.join.join()
    }

    pub fn stop(self) -> thread::Result<()> {
        self.request_stop();
        self.join()
    }
}

/// Runs `cycle` at `start + k * interval` on a dedicated thread. Cycles never
/// overlap; ticks that fall due while a cycle is still running are dropped.
pub fn start_scheduler<J, E>(
    mut cycle: J,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> std::io::Result<SchedulerHandle>
where
    J: FnMut() -> Result<(), E> + Send + 'static,
    E: Display + 'static,
{
    let running = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(SchedulerStats::default());

    let thread_stop = Arc::clone(&stop_flag);
    let thread_running = Arc::clone(&running);
    let thread_stats = Arc::clone(&stats);

    let join = thread::Builder::new()
        .name(SCHEDULER_THREAD_NAME.to_string())
        .spawn(move || {
            let mut next_tick = Instant::now() + interval;

            while wait_until(next_tick, &thread_stop) {
                thread_running.store(true, Ordering::Release);
                thread_stats.cycles_started.fetch_add(1, Ordering::Relaxed);

                if let Err(error) = cycle() {
                    thread_stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %error, "reconciliation cycle failed");
                }

                thread_running.store(false, Ordering::Release);

                next_tick += interval;
                let now = Instant::now();
                let mut missed = 0_u64;
                while next_tick <= now {
                    next_tick += interval;
                    missed += 1;
                }
                if missed > 0 {
                    thread_stats
                        .ticks_coalesced
                        .fetch_add(missed, Ordering::Relaxed);
                    tracing::warn!(
                        missed_ticks = missed,
                        "reconciliation cycle overran its interval; ticks dropped"
                    );
                }
            }

            tracing::info!("scheduler stopped");
        })?;

    Ok(SchedulerHandle {
        stop_flag,
        running,
        stats,
        join,
    })
}

/// Sleeps until `deadline`; returns false as soon as a stop is requested.
fn wait_until(deadline: Instant, stop_flag: &AtomicBool) -> bool {
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    match &config.replay_script {
        Some(path) => {
            let api = ReplayChargerApi::from_file(path).map_err(AppError::config)?;
            run_monitor(api, &config)
        }
        None => run_monitor(http_client(&config)?, &config),
    }
}

pub fn capture_once(config: &AppConfig) -> Result<PathBuf, AppError> {
    match &config.replay_script {
        Some(path) => {
            let api = ReplayChargerApi::from_file(path).map_err(AppError::config)?;
            capture_with(api, config)
        }
        None => capture_with(http_client(config)?, config),
    }
}

fn http_client(config: &AppConfig) -> Result<ChargerHttpClient, AppError> {
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| AppError::config("EV_API_KEY is required"))?;
    ChargerHttpClient::new(config.endpoints.clone(), api_key, config.http_timeout())
        .map_err(AppError::runtime)
}

fn capture_with<A: ChargerApi>(api: A, config: &AppConfig) -> Result<PathBuf, AppError> {
    let store = CsvSnapshotStore::new(&config.output_dir);
    let mut monitor = StationMonitor::new(api, store, SystemClock, MonitorSettings::from(config));
    monitor.capture_initial().map_err(AppError::initial_snapshot)
}

fn run_monitor<A: ChargerApi>(api: A, config: &AppConfig) -> Result<(), AppError> {
    let store = CsvSnapshotStore::new(&config.output_dir);
    let mut monitor = StationMonitor::new(api, store, SystemClock, MonitorSettings::from(config));

    monitor
        .capture_initial()
        .map_err(AppError::initial_snapshot)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested; finishing current cycle");
        signal_flag.store(true, Ordering::Relaxed);
    })
    .map_err(AppError::runtime)?;

    let interval = config.poll_interval();
    let handle = start_scheduler(
        move || monitor.tick().map(|_| ()),
        interval,
        Arc::clone(&stop_flag),
    )
    .map_err(AppError::runtime)?;

    tracing::info!(
        interval_secs = interval.as_secs(),
        "reconciliation scheduler started"
    );

    if handle.join().is_err() {
        return Err(AppError::runtime("scheduler thread panicked"));
    }

    tracing::info!("monitor shut down cleanly");
    Ok(())
}
