//! Consumer side of the pipeline: one writer per destination container.

use crate::backup::compress::CompressorConfig;
use crate::backup::destination::DestinationQueue;
use crate::backup::function_path;
use crate::backup::path_unit::{entry_name, DestinationId};
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::tar::TarContainer;

use function_name::named;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// Not started yet
    Idle,
    Initializing,
    Draining,
    Closing,
    Closed,
    /// The container could not be opened; nothing was written
    Abandoned,
    /// The container could not be finalized and may be unreadable
    Failed,
}

/// What one writer did during a run.
#[derive(Clone, Debug)]
pub struct WriterReport {
    pub destination: DestinationId,
    pub state: WriterState,
    pub written: u64,
    pub failed: u64,
    pub container: PathBuf,
}

impl WriterReport {
    /// The container holds everything the writer reported as written.
    pub fn is_complete(&self) -> bool {
        self.state == WriterState::Closed
    }
}

struct WriterInner {
    state: WriterState,
    container: Option<TarContainer>,
}

/// Drains one [`DestinationQueue`] into one container.
///
/// Container open, append and close all go through `inner`, so a second
/// `start` cannot interleave with the first.
pub struct ArchiveWriter {
    queue: Arc<DestinationQueue>,
    container_path: PathBuf,
    compressor: CompressorConfig,
    poll_interval: Duration,
    inner: Mutex<WriterInner>,
}

#[derive(Default)]
struct EntryCounts {
    written: u64,
    failed: u64,
}

impl ArchiveWriter {
    pub fn new<P: Into<PathBuf>>(
        queue: Arc<DestinationQueue>,
        container_path: P,
        compressor: CompressorConfig,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            container_path: container_path.into(),
            compressor,
            poll_interval,
            inner: Mutex::new(WriterInner {
                state: WriterState::Idle,
                container: None,
            }),
        }
    }

    pub fn destination(&self) -> &DestinationId {
        self.queue.destination()
    }

    pub fn queue(&self) -> &Arc<DestinationQueue> {
        &self.queue
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    pub fn state(&self) -> WriterState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, WriterInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, state: WriterState, counts: EntryCounts) -> WriterReport {
        WriterReport {
            destination: self.destination().clone(),
            state,
            written: counts.written,
            failed: counts.failed,
            container: self.container_path.clone(),
        }
    }

    /// Report for a writer whose thread never ran.
    pub fn abandoned_report(&self) -> WriterReport {
        self.report(WriterState::Abandoned, EntryCounts::default())
    }

    /// Runs the writer until `shutdown` is raised and the queue is drained.
    ///
    /// Every path pushed before the queue closes is written. The controller
    /// closes the queue before raising `shutdown`; the writer closes it again
    /// on its own, which is a no-op in that case.
    pub fn start(&self, shutdown: &AtomicBool) -> WriterReport {
        if let Err(state) = self.open() {
            return self.report(state, EntryCounts::default());
        }

        let mut counts = EntryCounts::default();
        while !shutdown.load(Ordering::SeqCst) {
            if let Some(path) = self.queue.try_pop(self.poll_interval) {
                self.add_file(&path, &mut counts);
            }
        }

        self.queue.close_for_writing();
        debug!(
            "Destination {} draining {} buffered paths",
            self.destination(),
            self.queue.len()
        );
        for path in self.queue.drain_remaining() {
            self.add_file(&path, &mut counts);
        }

        let state = self.close();
        self.report(state, counts)
    }

    /// Returns the state to report when the writer must not drain.
    fn open(&self) -> Result<(), WriterState> {
        let mut inner = self.lock();
        if inner.state != WriterState::Idle {
            error!(
                "Writer for {} started twice (state {:?}), ignoring",
                self.destination(),
                inner.state
            );
            return Err(inner.state);
        }

        inner.state = WriterState::Initializing;
        match TarContainer::create(&self.container_path, &self.compressor) {
            Ok(container) => {
                info!("Writing destination {} to {:?}", self.destination(), container.path());
                inner.container = Some(container);
                inner.state = WriterState::Draining;
                Ok(())
            }
            Err(e) => {
                inner.state = WriterState::Abandoned;
                let dropped = self.queue.abandon();
                error!(
                    "Abandoning destination {}, {} queued files will not be written: {e}",
                    self.destination(),
                    dropped
                );
                Err(WriterState::Abandoned)
            }
        }
    }

    #[named]
    fn add_file(&self, path: &Arc<Path>, counts: &mut EntryCounts) {
        let mut inner = self.lock();
        let Some(container) = inner.container.as_mut() else {
            error!("Attempted to add {:?} before the container was opened", path);
            self.queue.stats().increment_skipped_file();
            counts.failed += 1;
            return;
        };

        let name = entry_name(path);
        match container
            .append_entry(path, &name)
            .with_debug_object_and_fn_name(path.clone(), function_path!())
        {
            Ok(size) => {
                tracing::trace!("Added {:?} as {:?} ({} bytes)", path, name, size);
                self.queue.stats().add_file_size(size);
                counts.written += 1;
            }
            Err(e) => {
                warn!("Skipping entry: {e}");
                self.queue.stats().increment_skipped_file();
                counts.failed += 1;
            }
        }
    }

    fn close(&self) -> WriterState {
        let mut inner = self.lock();
        inner.state = WriterState::Closing;
        let state = match inner.container.take().map(TarContainer::finish) {
            Some(Ok(_)) => WriterState::Closed,
            Some(Err(e)) => {
                error!("Finalizing container for {} failed: {e}", self.destination());
                WriterState::Failed
            }
            None => WriterState::Closed,
        };
        inner.state = state;
        state
    }
}
