use std::fmt::Display;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

use crate::tracker::session::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlockCategory {
    Social,
    Entertainment,
    Shopping,
    Other,
}

impl Display for BlockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockCategory::Social => write!(f, "social"),
            BlockCategory::Entertainment => write!(f, "entertainment"),
            BlockCategory::Shopping => write!(f, "shopping"),
            BlockCategory::Other => write!(f, "other"),
        }
    }
}

pub const DEFAULT_BLOCK_DURATION: &str = "always";

fn default_block_duration() -> String {
    DEFAULT_BLOCK_DURATION.into()
}

/// The aggregator groups sessions without a category under `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A blocked site as served by the block-list endpoint. The same shape is kept in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub domain: String,
    #[serde(default)]
    pub category: Option<BlockCategory>,
    #[serde(default = "default_block_duration")]
    pub block_duration: String,
}

impl BlockEntry {
    /// An entry blocks every hostname containing its domain. An empty domain blocks nothing.
    pub fn matches(&self, domain: &str) -> bool {
        !self.domain.is_empty() && domain.contains(self.domain.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockEntry {
    pub domain: String,
    pub category: BlockCategory,
    pub block_duration: String,
}

/// Per-category totals computed by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    #[serde(rename = "_id", default, deserialize_with = "null_as_default")]
    pub category: Category,
    pub total_time: u64,
    pub sessions: u64,
}

/// A session as stored by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub website: String,
    pub domain: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::tracker::session::Category;

    use super::{BlockCategory, BlockEntry, CategoryReport};

    #[test]
    fn test_block_entry_from_service() -> Result<()> {
        let entries: Vec<BlockEntry> = serde_json::from_str(
            r#"[
                {"_id": "65f0", "domain": "reddit.com", "category": "social", "blockDuration": "always", "createdAt": "2024-03-12T10:00:00.000Z"},
                {"domain": "twitch.tv"}
            ]"#,
        )?;

        assert_eq!(entries[0].id.as_deref(), Some("65f0"));
        assert_eq!(entries[0].category, Some(BlockCategory::Social));
        assert_eq!(entries[1].category, None);
        assert_eq!(entries[1].block_duration, "always");
        Ok(())
    }

    #[test]
    fn test_block_entry_matching() {
        let entry = BlockEntry {
            id: None,
            domain: "reddit.com".into(),
            category: None,
            block_duration: "always".into(),
        };
        assert!(entry.matches("old.reddit.com"));
        assert!(!entry.matches("github.com"));

        let empty = BlockEntry {
            domain: String::new(),
            ..entry
        };
        assert!(!empty.matches("github.com"));
    }

    #[test]
    fn test_report_from_service() -> Result<()> {
        let report: Vec<CategoryReport> = serde_json::from_str(
            r#"[{"_id": "productive", "totalTime": 3600, "sessions": 4}, {"_id": null, "totalTime": 10, "sessions": 1}]"#,
        )?;
        assert_eq!(report[0].category, Category::Productive);
        assert_eq!(report[0].total_time, 3600);
        assert_eq!(report[1].category, Category::Neutral);
        Ok(())
    }
}
