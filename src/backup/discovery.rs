//! Producer side of the pipeline.
//!
//! Discovery workers pull units from the shared [`SourceWorkQueue`]. Files go
//! to the destination queue of their volume; directories are expanded one
//! level and their children pushed back onto the shared queue, so idle
//! workers pick up subtrees found by busy ones.

use crate::backup::copy_policy::CopyPolicy;
use crate::backup::function_path;
use crate::backup::path_unit::{CopyMode, PathKind, PathUnit};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::work_queue::SourceWorkQueue;

use function_name::named;
use itertools::Itertools;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Counters for what one worker did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub units_processed: u64,
    pub files_pushed: u64,
    pub dirs_expanded: u64,
    /// File units that were not queued: missing on disk, no destination, or
    /// rejected by a closed queue
    pub dropped: u64,
}

impl AddAssign for DiscoveryReport {
    fn add_assign(&mut self, rhs: Self) {
        self.units_processed += rhs.units_processed;
        self.files_pushed += rhs.files_pushed;
        self.dirs_expanded += rhs.dirs_expanded;
        self.dropped += rhs.dropped;
    }
}

pub struct DiscoveryWorker {
    id: usize,
    shared: Arc<SourceWorkQueue>,
    policy: Arc<dyn CopyPolicy>,
}

impl DiscoveryWorker {
    pub fn new(id: usize, shared: Arc<SourceWorkQueue>, policy: Arc<dyn CopyPolicy>) -> Self {
        Self { id, shared, policy }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Processes units until the shared queue is empty.
    ///
    /// Only running workers add units, so once every worker sees the queue
    /// empty no more work can appear.
    pub fn start(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        while let Some(unit) = self.shared.try_dequeue() {
            report.units_processed += 1;
            match unit.kind {
                PathKind::File => self.process_file(&unit, &mut report),
                PathKind::Directory => self.expand_directory(&unit, &mut report),
            }
        }
        debug!("Discovery worker {} finished: {:?}", self.id, report);
        report
    }

    fn process_file(&self, unit: &PathUnit, report: &mut DiscoveryReport) {
        if !unit.path.is_file() {
            warn!("Skipping {:?}, not an existing file", unit.path);
            report.dropped += 1;
            return;
        }

        let destination = unit.destination();
        let Some(queue) = self.shared.lookup_destination(&destination) else {
            warn!(
                "No destination {} configured for {:?}, dropping it",
                destination, unit.path
            );
            report.dropped += 1;
            return;
        };

        match queue.push(unit.path.clone()) {
            Ok(()) => {
                trace!("Queued {:?} for destination {}", unit.path, destination);
                report.files_pushed += 1;
            }
            Err(path) => {
                debug!("Destination {} already closed, {:?} not queued", destination, path);
                report.dropped += 1;
            }
        }
    }

    #[named]
    fn expand_directory(&self, unit: &PathUnit, report: &mut DiscoveryReport) {
        let children = WalkDir::new(&unit.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|res| match res {
                Ok(de) => child_unit(de, unit.copy_mode),
                Err(e) => {
                    let e = Error::from(e)
                        .with_debug_object_and_fn_name(unit.path.clone(), function_path!());
                    warn!("Ignoring unreadable entry: {e}");
                    None
                }
            })
            .filter(|child| self.policy.include(&child.path, child.kind, child.copy_mode))
            .collect_vec();

        trace!("Expanded {:?} into {} units", unit.path, children.len());
        report.dirs_expanded += 1;
        self.shared.enqueue_all(children);
    }
}

/// Regular files and directories become units; a symlink is followed only
/// when it points at a file, so directory cycles cannot re-enqueue forever.
fn child_unit(de: DirEntry, copy_mode: CopyMode) -> Option<PathUnit> {
    let file_type = de.file_type();
    let kind = if file_type.is_file() {
        PathKind::File
    } else if file_type.is_dir() {
        PathKind::Directory
    } else if file_type.is_symlink() && de.path().is_file() {
        PathKind::File
    } else {
        trace!("Skipping {:?}, not a file or directory", de.path());
        return None;
    };
    Some(PathUnit::new(kind, copy_mode, de.into_path()))
}
