//! Messages exchanged between the server and the browser page.
//!
use serde::{Deserialize, Serialize};

/// Snapshot of what the page currently shows.
#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PageState {
    pub running: bool,
    /// Text of each label slot, in class order.
    pub slots: Vec<String>,
    /// Alerts raised so far, oldest first.
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
    Failed,
}

/// Reply to the Start action.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct StartReply {
    pub status: StartStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartReply {
    pub fn started(class_count: usize) -> Self {
        Self {
            status: StartStatus::Started,
            class_count: Some(class_count),
            error: None,
        }
    }

    pub fn already_running(class_count: usize) -> Self {
        Self {
            status: StartStatus::AlreadyRunning,
            class_count: Some(class_count),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: StartStatus::Failed,
            class_count: None,
            error: Some(error),
        }
    }
}
