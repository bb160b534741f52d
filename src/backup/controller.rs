//! Builds and runs one backup: discovery workers feeding one archive writer
//! per destination, with a single shutdown signal for the writers.

use crate::backup::archive_writer::{ArchiveWriter, WriterReport, WriterState};
use crate::backup::compress::CompressorConfig;
use crate::backup::copy_policy::{CopyPolicy, IncludeAll};
use crate::backup::destination::DestinationQueue;
use crate::backup::discovery::{DiscoveryReport, DiscoveryWorker};
use crate::backup::path_unit::{DestinationId, PathUnit};
use crate::backup::progress::ProgressCount;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::WithMsg;
use crate::backup::stat::{BackupStat, StatSnapshot};
use crate::backup::tar::container_path;
use crate::backup::validate::validate_dir_exist_or_created;
use crate::backup::work_queue::SourceWorkQueue;

use bon::Builder;
use chrono::Utc;
use itertools::Itertools;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Discovery workers started per destination.
pub const DEFAULT_FAN_OUT: usize = 2;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Success,
    /// Nothing to do
    Info,
    /// The run finished but some discovered files are not in a container
    Partial,
    Error,
}

#[derive(Clone, Debug)]
pub struct BackupOutcome {
    pub kind: OutcomeKind,
    pub message: String,
    pub stats: StatSnapshot,
    pub writers: Vec<WriterReport>,
}

impl BackupOutcome {
    fn new<S: Into<String>>(kind: OutcomeKind, message: S, stats: StatSnapshot) -> Self {
        Self {
            kind,
            message: message.into(),
            stats,
            writers: vec![],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success | OutcomeKind::Info)
    }
}

impl Display for BackupOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Threads and queues of one running backup.
struct BackupRun {
    shared: Arc<SourceWorkQueue>,
    shutdown: Arc<AtomicBool>,
    writers: Vec<(DestinationId, JoinHandle<WriterReport>)>,
    unstarted: Vec<WriterReport>,
    discovery: Vec<JoinHandle<DiscoveryReport>>,
}

/// Runs one backup of `seeds` into `out_dir`.
#[derive(Builder)]
pub struct BackupController {
    #[builder(into)]
    out_dir: PathBuf,
    #[builder(default)]
    seeds: Vec<PathUnit>,
    #[builder(default = Arc::new(IncludeAll))]
    policy: Arc<dyn CopyPolicy>,
    #[builder(default = DEFAULT_FAN_OUT)]
    fan_out: usize,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    poll_interval: Duration,
    #[builder(default)]
    compressor: CompressorConfig,
    /// Raising this stops the run early; buffered files are still written.
    #[builder(default)]
    cancel: Arc<AtomicBool>,
    #[builder(skip)]
    stats: Arc<BackupStat>,
    #[builder(skip)]
    started: AtomicBool,
}

impl BackupController {
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn seeds(&self) -> &[PathUnit] {
        &self.seeds
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out.max(1)
    }

    /// Snapshot of the run counters, safe to poll while `start` runs.
    pub fn stats(&self) -> StatSnapshot {
        self.stats.snapshot()
    }

    pub fn stat_handle(&self) -> Arc<BackupStat> {
        self.stats.clone()
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Distinct destinations of the seed units, sorted.
    pub fn destinations(&self) -> Vec<DestinationId> {
        self.seeds
            .iter()
            .map(PathUnit::destination)
            .unique()
            .sorted()
            .collect()
    }

    pub fn start(&self, log_stats: bool) -> BackupOutcome {
        if self.seeds.is_empty() {
            return BackupOutcome::new(
                OutcomeKind::Info,
                "No paths found to be included in backup.",
                self.stats(),
            );
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return BackupOutcome::new(
                OutcomeKind::Error,
                "Backup already started for this controller.",
                self.stats(),
            );
        }
        if let Err(e) = validate_dir_exist_or_created(&self.out_dir) {
            error!("Setting up the folder {:?} failed: {e}", self.out_dir);
            return BackupOutcome::new(
                OutcomeKind::Error,
                format!("Setting up the folder: {:?}", self.out_dir),
                self.stats(),
            );
        }

        let start_time = Utc::now();
        let run = self.spawn_run();
        let cancelled = self.wait_for_discovery(&run, log_stats);
        signal_shutdown(&run);
        let (writers, discovery) = join_run(run);

        let stats = self.stats();
        if log_stats {
            ProgressCount::draw_complete(stats.current_files, stats.total_files);
            let elapsed = Utc::now() - start_time;
            info!(
                "Backup took: {:.3} seconds",
                elapsed.num_milliseconds() as f64 / 1000.0
            );
            info!("Backup copied {} files", stats.current_files);
            info!("Backup compressed size {} MB", stats.total_megabytes());
        }
        info!("Discovery finished: {:?}", discovery);

        let mut outcome = self.resolve_outcome(&writers, stats, cancelled);
        outcome.writers = writers;
        outcome
    }

    fn build_writers(&self) -> Vec<Arc<ArchiveWriter>> {
        self.destinations()
            .into_iter()
            .map(|id| {
                let queue = Arc::new(DestinationQueue::new(id.clone(), self.stats.clone()));
                Arc::new(ArchiveWriter::new(
                    queue,
                    container_path(&self.out_dir, &id, &self.compressor),
                    self.compressor.clone(),
                    self.poll_interval,
                ))
            })
            .collect()
    }

    fn spawn_run(&self) -> BackupRun {
        let writers = self.build_writers();
        let queues = writers.iter().map(|w| w.queue().clone()).collect_vec();
        let shared = Arc::new(SourceWorkQueue::new(self.seeds.iter().cloned(), queues));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut run = BackupRun {
            shared: shared.clone(),
            shutdown: shutdown.clone(),
            writers: vec![],
            unstarted: vec![],
            discovery: vec![],
        };

        for writer in writers {
            let name = format!("archive-{}", writer.destination());
            let shutdown = shutdown.clone();
            let spawned = std::thread::Builder::new()
                .name(name.clone())
                .spawn({
                    let writer = writer.clone();
                    move || writer.start(&shutdown)
                })
                .map_err(|e| Error::thread_spawn(name, e));
            match spawned {
                Ok(handle) => run.writers.push((writer.destination().clone(), handle)),
                Err(e) => {
                    let dropped = writer.queue().abandon();
                    error!("{e}, abandoning destination ({dropped} files dropped)");
                    run.unstarted.push(writer.abandoned_report());
                }
            }
        }

        let destination_count = run.writers.len() + run.unstarted.len();
        let worker_count = self.fan_out() * destination_count;
        info!(
            "Starting {} discovery workers for {} destinations, {}",
            worker_count, destination_count, self.compressor
        );
        let spawn_errors = (0..worker_count)
            .filter_map(|id| {
                let worker = DiscoveryWorker::new(id, shared.clone(), self.policy.clone());
                let name = format!("discovery-{id}");
                std::thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || worker.start())
                    .map(|handle| run.discovery.push(handle))
                    .map_err(|e| Error::thread_spawn(name, e))
                    .err()
            })
            .collect_vec();
        if !spawn_errors.is_empty() {
            warn!("{}", Error::from(spawn_errors).with_msg("Some discovery workers did not start"));
        }
        if run.discovery.is_empty() {
            warn!("No discovery thread could be started, discovering on the controller thread");
            DiscoveryWorker::new(0, shared, self.policy.clone()).start();
        }

        run
    }

    /// Polls until discovery has ended and every discovered file is settled,
    /// or until cancellation. Returns whether the run was cancelled.
    fn wait_for_discovery(&self, run: &BackupRun, log_stats: bool) -> bool {
        loop {
            std::thread::sleep(self.poll_interval);
            let snapshot = self.stats();
            if log_stats {
                ProgressCount::draw(snapshot.current_files, snapshot.total_files);
            }

            if self.cancel.load(Ordering::SeqCst) {
                let abandoned = run.shared.abandon();
                warn!("Backup cancelled, {abandoned} pending units abandoned");
                return true;
            }

            if !run.discovery.iter().all(JoinHandle::is_finished) {
                continue;
            }
            // Discovery is over, so the totals are final from here on.
            let writers_gone = run.writers.iter().all(|(_, h)| h.is_finished());
            if self.stats().is_settled() || writers_gone {
                return false;
            }
        }
    }

    fn resolve_outcome(
        &self,
        writers: &[WriterReport],
        stats: StatSnapshot,
        cancelled: bool,
    ) -> BackupOutcome {
        let incomplete = writers
            .iter()
            .filter(|w| !w.is_complete())
            .map(|w| format!("{} ({:?})", w.destination, w.state))
            .join(", ");

        let mut problems = vec![];
        if cancelled {
            problems.push("backup was cancelled".to_string());
        }
        if !incomplete.is_empty() {
            problems.push(format!("incomplete destinations: {incomplete}"));
        }
        if stats.current_files < stats.total_files {
            problems.push(format!(
                "{} of {} files not written",
                stats.total_files - stats.current_files,
                stats.total_files
            ));
        }

        if problems.is_empty() {
            BackupOutcome::new(
                OutcomeKind::Success,
                format!("Backed up {} files into {:?}", stats.current_files, self.out_dir),
                stats,
            )
        } else {
            let message = problems.join("; ");
            warn!("Backup incomplete: {message}");
            BackupOutcome::new(OutcomeKind::Partial, message, stats)
        }
    }
}

/// Closes every destination queue, then raises the writers' shutdown flag, so
/// a path pushed after the signal is rejected instead of archived.
fn signal_shutdown(run: &BackupRun) {
    run.shared
        .destinations()
        .for_each(|queue| queue.close_for_writing());
    run.shutdown.store(true, Ordering::SeqCst);
}

fn join_run(run: BackupRun) -> (Vec<WriterReport>, DiscoveryReport) {
    let mut reports = run.unstarted;
    for (destination, handle) in run.writers {
        match handle.join() {
            Ok(report) => reports.push(report),
            Err(_) => {
                error!("Writer thread for {destination} panicked");
                reports.push(WriterReport {
                    destination,
                    state: WriterState::Failed,
                    written: 0,
                    failed: 0,
                    container: PathBuf::new(),
                });
            }
        }
    }

    let mut discovery = DiscoveryReport::default();
    for handle in run.discovery {
        match handle.join() {
            Ok(report) => discovery += report,
            Err(_) => error!("A discovery thread panicked"),
        }
    }
    (reports, discovery)
}
