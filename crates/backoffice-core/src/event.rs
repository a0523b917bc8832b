//! Events pushed to stream clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State of a long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, not yet running.
    Queued,
    /// In progress.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// A typed, immutable notification.
///
/// Serialized as `{"kind": "...", "payload": {...}}`.
///
/// # Example
///
/// ```
/// use backoffice_core::ApiEvent;
///
/// let event = ApiEvent::AnnouncementRead { store_id: 3, announcement_id: 9 };
/// let json = serde_json::to_value(&event).unwrap();
/// assert_eq!(json["kind"], "announcement_read");
/// assert_eq!(json["payload"]["announcement_id"], 9);
/// assert_eq!(event.store_id(), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ApiEvent {
    /// Register, opening or staffing state of a store changed.
    StoreStatusChanged {
        /// Store the change belongs to.
        store_id: i64,
        /// Current status document.
        status: Value,
    },
    /// Free-form message, optionally scoped to a store.
    GenericMessage {
        /// Store scope; `None` reaches every client.
        store_id: Option<i64>,
        /// Human-readable message.
        message: String,
        /// Attached data.
        #[serde(default)]
        data: Value,
    },
    /// Progress of a background task.
    TaskProgress {
        /// Store the task runs for.
        store_id: i64,
        /// Task name.
        task: String,
        /// Target day of the task, if it has one (`YYYY-MM-DD`).
        target_day: Option<String>,
        /// Current state.
        status: TaskStatus,
        /// Optional detail (row counts, failure summary).
        #[serde(default)]
        detail: Value,
    },
    /// A store marked an announcement as read.
    AnnouncementRead {
        /// Store that read it.
        store_id: i64,
        /// Announcement.
        announcement_id: i64,
    },
}

impl ApiEvent {
    /// The store this event is scoped to. `None` means every store.
    #[must_use]
    pub fn store_id(&self) -> Option<i64> {
        match self {
            Self::StoreStatusChanged { store_id, .. }
            | Self::TaskProgress { store_id, .. }
            | Self::AnnouncementRead { store_id, .. } => Some(*store_id),
            Self::GenericMessage { store_id, .. } => *store_id,
        }
    }

    /// Wire name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StoreStatusChanged { .. } => "store_status_changed",
            Self::GenericMessage { .. } => "generic_message",
            Self::TaskProgress { .. } => "task_progress",
            Self::AnnouncementRead { .. } => "announcement_read",
        }
    }
}

/// Anything that accepts events for delivery.
///
/// Publishing is fire-and-forget; delivery failures stay with the publisher's
/// implementation and never reach the caller.
pub trait EventPublisher: Send + Sync {
    /// Delivers `event` to the clients it is scoped to.
    fn publish(&self, event: ApiEvent);
}
