//! Indexing task lifecycle: status state machine, progress, outcomes.

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{IndexingOrchestrator, ProjectStatistics};
pub use registry::TaskRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Full pipeline for one file: segment, embed, extract, discover.
    FullIndex,
    /// Relationship discovery only, over the project's current chunks.
    RelationshipDiscovery,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullIndex => "full_index",
            Self::RelationshipDiscovery => "relationship_discovery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full_index" => Some(Self::FullIndex),
            "relationship_discovery" => Some(Self::RelationshipDiscovery),
            _ => None,
        }
    }
}

/// Task lifecycle status.
///
/// Transitions are append-only: `Pending → Started → Progress* →
/// {Completed | Failed | Cancelled}`. The terminal states absorb: nothing
/// transitions out of them, and nothing ever transitions back into
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Progress => "PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "STARTED" => Some(Self::Started),
            "PROGRESS" => Some(Self::Progress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() || next == Self::Pending {
            return false;
        }
        match self {
            Self::Pending => matches!(next, Self::Started | Self::Cancelled | Self::Failed),
            Self::Started | Self::Progress => matches!(
                next,
                Self::Progress | Self::Completed | Self::Failed | Self::Cancelled
            ),
            _ => false,
        }
    }
}

/// Progress snapshot carried by `Progress` updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
    pub message: String,
}

impl TaskProgress {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }
}

/// Per-stage failure counts surfaced in the result summary. Per-item
/// failures here did not fail the task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureCounts {
    pub chunk_failures: usize,
    pub entity_failures: usize,
    pub relationship_failures: usize,
}

impl FailureCounts {
    pub fn total(&self) -> usize {
        self.chunk_failures + self.entity_failures + self.relationship_failures
    }
}

/// Result summary carried by a `Completed` task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskOutcome {
    pub chunks_indexed: usize,
    pub embeddings_generated: usize,
    pub entities_created: usize,
    pub entities_updated: usize,
    pub relationships_written: usize,
    pub failures: FailureCounts,
    /// True when an unchanged file was detected and the pipeline
    /// short-circuited.
    pub skipped_unchanged: bool,
}

/// A persisted indexing task. Never deleted; cancellation is a status
/// transition, not a removal.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub project_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: TaskProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskOutcome>,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
}

impl TaskRecord {
    /// Create a new `Pending` record.
    pub fn new(project_id: impl Into<String>, kind: TaskKind) -> Self {
        let project_id = project_id.into();
        let created_at = Utc::now();
        let task_id = make_task_id(&project_id, kind, created_at);
        Self {
            task_id,
            project_id,
            kind,
            status: TaskStatus::Pending,
            progress: TaskProgress::default(),
            created_at,
            started_at: None,
            completed_at: None,
            result: None,
            metadata: serde_json::Value::Object(Default::default()),
            error: None,
        }
    }

    /// Duration from `Started` to the terminal transition. Undefined (None)
    /// for tasks that never reached `Started` or have not finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// Derive a unique task id from its key and creation instant.
fn make_task_id(project_id: &str, kind: TaskKind, created_at: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(project_id.as_bytes());
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}
