use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    remote::types::CategoryReport,
    tracker::session::{Category, CompletedSession},
    utils::percentage::{share_percentage, Percentage},
};

/// Time and session count of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryUsage {
    pub seconds: u64,
    pub sessions: u64,
}

/// Totals over a range of days, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    usage: BTreeMap<Category, CategoryUsage>,
}

impl ReportSummary {
    /// From the per-category totals computed by the aggregator. Duplicated categories are summed.
    pub fn from_remote(reports: &[CategoryReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add(report.category, report.total_time, report.sessions);
        }
        summary
    }

    /// From locally recorded sessions that ended inside `[start, end)`.
    pub fn from_sessions<'a>(
        sessions: impl IntoIterator<Item = &'a CompletedSession>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let mut summary = Self::default();
        for session in sessions
            .into_iter()
            .filter(|session| session.end_time >= start && session.end_time < end)
        {
            summary.add(session.category, session.duration, 1);
        }
        summary
    }

    fn add(&mut self, category: Category, seconds: u64, sessions: u64) {
        let usage = self.usage.entry(category).or_default();
        usage.seconds = usage.seconds.saturating_add(seconds);
        usage.sessions = usage.sessions.saturating_add(sessions);
    }

    pub fn usage(&self, category: Category) -> CategoryUsage {
        self.usage.get(&category).copied().unwrap_or_default()
    }

    pub fn total_time(&self) -> u64 {
        self.usage.values().map(|usage| usage.seconds).sum()
    }

    pub fn total_sessions(&self) -> u64 {
        self.usage.values().map(|usage| usage.sessions).sum()
    }

    /// Share of productive time. `None` when nothing was tracked.
    pub fn productivity_ratio(&self) -> Option<Percentage> {
        share_percentage(self.usage(Category::Productive).seconds, self.total_time())
    }

    /// Average session length in whole seconds. `None` without sessions.
    pub fn average_session(&self) -> Option<u64> {
        self.total_time().checked_div(self.total_sessions())
    }

    pub fn is_empty(&self) -> bool {
        self.total_sessions() == 0 && self.total_time() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::{
        remote::types::CategoryReport,
        tracker::session::{Category, CompletedSession},
        utils::clock::test_clock::TEST_START_DATE,
    };

    use super::{CategoryUsage, ReportSummary};

    fn report(category: Category, total_time: u64, sessions: u64) -> CategoryReport {
        CategoryReport {
            category,
            total_time,
            sessions,
        }
    }

    #[test]
    fn test_remote_summary() {
        let summary = ReportSummary::from_remote(&[
            report(Category::Productive, 3000, 4),
            report(Category::Distracting, 1000, 2),
            report(Category::Neutral, 0, 2),
        ]);

        assert_eq!(summary.total_time(), 4000);
        assert_eq!(summary.total_sessions(), 8);
        assert_eq!(
            summary.productivity_ratio().map(|ratio| ratio.to_string()),
            Some("75.0%".to_string())
        );
        assert_eq!(summary.average_session(), Some(500));
        assert_eq!(
            summary.usage(Category::Distracting),
            CategoryUsage {
                seconds: 1000,
                sessions: 2
            }
        );
    }

    #[test]
    fn test_zero_denominators() {
        let empty = ReportSummary::from_remote(&[]);
        assert!(empty.is_empty());
        assert_eq!(empty.productivity_ratio(), None);
        assert_eq!(empty.average_session(), None);

        let zero_time = ReportSummary::from_remote(&[report(Category::Neutral, 0, 3)]);
        assert_eq!(zero_time.productivity_ratio(), None);
        assert_eq!(zero_time.average_session(), Some(0));

        let no_sessions = ReportSummary::from_remote(&[report(Category::Productive, 60, 0)]);
        assert_eq!(no_sessions.average_session(), None);
        assert!(no_sessions.productivity_ratio().is_some());
    }

    #[test]
    fn test_local_summary_respects_range() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let session = |offset_hours: i64, category: Category, duration: u64| {
            let end = start + Duration::hours(offset_hours);
            CompletedSession {
                domain: "github.com".into(),
                url: "https://github.com".into(),
                tab_id: None,
                start_time: end - Duration::seconds(duration as i64),
                end_time: end,
                duration,
                category,
            }
        };
        let sessions = [
            session(-1, Category::Productive, 100),
            session(1, Category::Productive, 120),
            session(2, Category::Distracting, 60),
            session(24, Category::Neutral, 30),
        ];

        let summary =
            ReportSummary::from_sessions(&sessions, start, start + Duration::days(1));
        assert_eq!(summary.total_time(), 180);
        assert_eq!(summary.total_sessions(), 2);
        assert_eq!(summary.average_session(), Some(90));
    }
}
