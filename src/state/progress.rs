/// Progress counters shared between the pipeline and external observers
///
/// Counters are atomics so tasks can update them without locking. Only the
/// crate advances them; observers get read-only accessors and snapshots.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One of the pipeline's four sequential stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fetching the start page and extracting detail links
    Listing,

    /// Fetching detail pages and extracting sub-page links
    Details,

    /// Fetching sub-pages and extracting image URLs
    Images,

    /// Streaming images to disk
    Downloads,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 4] = [
        Stage::Listing,
        Stage::Details,
        Stage::Images,
        Stage::Downloads,
    ];

    fn index(self) -> usize {
        match self {
            Self::Listing => 0,
            Self::Details => 1,
            Self::Images => 2,
            Self::Downloads => 3,
        }
    }

    /// Human readable stage name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Details => "detail links",
            Self::Images => "image links",
            Self::Downloads => "downloads",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Default)]
struct StageCounter {
    total: AtomicU64,
    completed: AtomicU64,
}

/// Per-stage completed/total counters plus bytes written
#[derive(Debug, Default)]
pub struct ProgressCounters {
    stages: [StageCounter; 4],
    bytes_written: AtomicU64,
}

/// Point-in-time copy of one stage's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    pub stage: Stage,
    pub completed: u64,
    pub total: u64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub stages: Vec<StageProgress>,
    pub bytes_written: u64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successfully completed units of work in a stage
    pub fn completed(&self, stage: Stage) -> u64 {
        self.stages[stage.index()].completed.load(Ordering::SeqCst)
    }

    /// Number of units scheduled in a stage (0 until the stage starts)
    pub fn total(&self, stage: Stage) -> u64 {
        self.stages[stage.index()].total.load(Ordering::SeqCst)
    }

    /// Total bytes written by completed downloads
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stages: Stage::ALL
                .iter()
                .map(|&stage| StageProgress {
                    stage,
                    completed: self.completed(stage),
                    total: self.total(stage),
                })
                .collect(),
            bytes_written: self.bytes_written(),
        }
    }

    pub(crate) fn set_total(&self, stage: Stage, total: u64) {
        self.stages[stage.index()].total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn record_completed(&self, stage: Stage) {
        self.stages[stage.index()]
            .completed
            .fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_bytes(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::SeqCst);
    }
}

impl ProgressSnapshot {
    pub fn stage(&self, stage: Stage) -> Option<&StageProgress> {
        self.stages.iter().find(|p| p.stage == stage)
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .stages
            .iter()
            .filter(|p| p.total > 0)
            .map(|p| format!("{} {}/{}", p.stage, p.completed, p.total))
            .collect();

        if parts.is_empty() {
            write!(f, "waiting for first stage")
        } else {
            write!(f, "{}, {} bytes written", parts.join(", "), self.bytes_written)
        }
    }
}
