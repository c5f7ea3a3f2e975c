use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    #[default]
    Neutral,
    Distracting,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Productive,
        Category::Neutral,
        Category::Distracting,
    ];
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Productive => write!(f, "productive"),
            Category::Neutral => write!(f, "neutral"),
            Category::Distracting => write!(f, "distracting"),
        }
    }
}

/// What the activation source reports: the page that became active and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationTarget {
    pub url: String,
    #[serde(default)]
    pub tab_id: Option<i64>,
}

/// A trackable site, i.e. an [ActivationTarget] with a web url and a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSite {
    pub domain: String,
    pub url: String,
    pub tab_id: Option<i64>,
}

impl ActiveSite {
    /// Internal browser pages, extension pages, local files and urls without a host are not
    /// tracked at all.
    pub fn from_target(target: &ActivationTarget) -> Option<ActiveSite> {
        let parsed = Url::parse(&target.url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let domain = parsed.host_str().filter(|host| !host.is_empty())?;

        Some(ActiveSite {
            domain: domain.to_string(),
            url: target.url.clone(),
            tab_id: target.tab_id,
        })
    }
}

/// A session that is still running. It can only be finished through [OpenSession::close], which
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSession {
    pub domain: String,
    pub url: String,
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    pub category: Category,
}

impl OpenSession {
    pub fn open(site: ActiveSite, category: Category, start_time: DateTime<Utc>) -> Self {
        Self {
            domain: site.domain,
            url: site.url,
            tab_id: site.tab_id,
            start_time,
            category,
        }
    }

    /// Same page in the same tab. Browsers report activation and load completion separately, and
    /// the second report must not split the session.
    pub fn is_same_site(&self, site: &ActiveSite) -> bool {
        self.domain == site.domain && self.url == site.url && self.tab_id == site.tab_id
    }

    /// Stamps the end of the session. An end before the start (clock going backwards) is moved
    /// to the start, so the duration is never negative.
    pub fn close(self, end_time: DateTime<Utc>) -> CompletedSession {
        let end_time = end_time.max(self.start_time);
        let duration = u64::try_from((end_time - self.start_time).num_seconds()).unwrap_or(0);

        CompletedSession {
            domain: self.domain,
            url: self.url,
            tab_id: self.tab_id,
            start_time: self.start_time,
            end_time,
            duration,
            category: self.category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub domain: String,
    pub url: String,
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end, floored.
    pub duration: u64,
    pub category: Category,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::utils::clock::test_clock::TEST_START_DATE;

    use super::{ActivationTarget, ActiveSite, Category, OpenSession};

    fn target(url: &str) -> ActivationTarget {
        ActivationTarget {
            url: url.into(),
            tab_id: Some(1),
        }
    }

    #[test]
    fn test_web_pages_are_trackable() {
        let site = ActiveSite::from_target(&target("https://github.com/rust-lang/rust")).unwrap();
        assert_eq!(site.domain, "github.com");
        assert_eq!(site.url, "https://github.com/rust-lang/rust");
        assert_eq!(site.tab_id, Some(1));
    }

    #[test]
    fn test_internal_pages_are_not_trackable() {
        for url in [
            "chrome://extensions",
            "chrome-extension://abcdef/popup.html",
            "about:blank",
            "file:///home/user/notes.txt",
            "not a url",
            "",
        ] {
            assert_eq!(ActiveSite::from_target(&target(url)), None, "{url}");
        }
    }

    #[test]
    fn test_duration_is_floored() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let site = ActiveSite::from_target(&target("https://github.com")).unwrap();
        let session = OpenSession::open(site, Category::Productive, start);

        let completed = session.close(start + Duration::milliseconds(125_999));
        assert_eq!(completed.duration, 125);
        assert_eq!(completed.end_time - completed.start_time, Duration::milliseconds(125_999));
    }

    #[test]
    fn test_clock_going_backwards_gives_zero_duration() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let site = ActiveSite::from_target(&target("https://github.com")).unwrap();
        let session = OpenSession::open(site, Category::Productive, start);

        let completed = session.close(start - Duration::seconds(30));
        assert_eq!(completed.duration, 0);
        assert_eq!(completed.end_time, completed.start_time);
    }
}
