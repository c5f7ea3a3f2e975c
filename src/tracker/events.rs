use serde::{Deserialize, Serialize};

use super::session::{ActivationTarget, OpenSession};

/// Messages coming from the activation source, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TrackerEvent {
    /// A page became active: tab switch, navigation or focus change.
    Activation(ActivationTarget),
    TrackingToggled {
        enabled: bool,
        #[serde(default)]
        active: Option<ActivationTarget>,
    },
    QueryCurrent,
    TodayStats,
    Resync,
}

/// Messages for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TrackerResponse {
    Current {
        session: Option<OpenSession>,
        tracking_enabled: bool,
    },
    TodayStats {
        date: String,
        productive: u64,
        neutral: u64,
        distracting: u64,
    },
    /// The site in `tab_id` is blocked and should be navigated away from.
    Redirect {
        tab_id: Option<i64>,
        domain: String,
    },
}
