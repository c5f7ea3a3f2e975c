use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    tracker::session::Category,
    utils::time::{date_to_key, local_day},
};

use super::ledger::LedgerRecord;

/// Seconds spent per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    #[serde(default)]
    pub productive: u64,
    #[serde(default)]
    pub neutral: u64,
    #[serde(default)]
    pub distracting: u64,
}

impl CategoryTotals {
    pub fn add(&mut self, category: Category, seconds: u64) {
        let total = match category {
            Category::Productive => &mut self.productive,
            Category::Neutral => &mut self.neutral,
            Category::Distracting => &mut self.distracting,
        };
        *total = total.saturating_add(seconds);
    }

    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Productive => self.productive,
            Category::Neutral => self.neutral,
            Category::Distracting => self.distracting,
        }
    }

    pub fn total(&self) -> u64 {
        self.productive
            .saturating_add(self.neutral)
            .saturating_add(self.distracting)
    }
}

/// Running totals per calendar day. A cache for status displays; the ledger and the aggregator
/// are the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyStats(BTreeMap<String, CategoryTotals>);

impl DailyStats {
    pub fn add(&mut self, day: NaiveDate, category: Category, seconds: u64) {
        self.0
            .entry(date_to_key(day))
            .or_default()
            .add(category, seconds);
    }

    pub fn day(&self, day: NaiveDate) -> CategoryTotals {
        self.0.get(&date_to_key(day)).copied().unwrap_or_default()
    }

    /// Recomputes the totals from scratch. Sessions count towards the local day they ended on.
    pub fn rebuild<'a>(records: impl IntoIterator<Item = &'a LedgerRecord>) -> Self {
        let mut stats = DailyStats::default();
        for record in records {
            let session = &record.session;
            stats.add(local_day(session.end_time), session.category, session.duration);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

    use crate::{
        sync::ledger::LedgerRecord,
        tracker::session::{Category, CompletedSession},
        utils::clock::test_clock::TEST_START_DATE,
    };

    use super::{CategoryTotals, DailyStats};

    #[test]
    fn test_totals_accumulate_per_day() -> anyhow::Result<()> {
        let day = TEST_START_DATE.date();
        let next_day = day.succ_opt().unwrap();

        let mut stats = DailyStats::default();
        stats.add(day, Category::Productive, 125);
        stats.add(day, Category::Productive, 5);
        stats.add(day, Category::Distracting, 60);
        stats.add(next_day, Category::Neutral, 1);

        assert_eq!(
            stats.day(day),
            CategoryTotals {
                productive: 130,
                neutral: 0,
                distracting: 60
            }
        );
        assert_eq!(stats.day(next_day).total(), 1);
        assert_eq!(
            stats.day(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
            CategoryTotals::default()
        );

        let value = serde_json::to_value(&stats)?;
        assert_eq!(value["2018-07-04"]["productive"], 130);
        Ok(())
    }

    #[test]
    fn test_rebuild_uses_local_end_day() {
        let day = TEST_START_DATE.date();
        let next_day = day.succ_opt().unwrap();
        let midnight = Local
            .from_local_datetime(&next_day.and_time(NaiveTime::MIN))
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        let record = LedgerRecord::new(CompletedSession {
            domain: "reddit.com".into(),
            url: "https://reddit.com".into(),
            tab_id: None,
            start_time: midnight - Duration::seconds(30),
            end_time: midnight + Duration::seconds(30),
            duration: 60,
            category: Category::Distracting,
        });

        let stats = DailyStats::rebuild([&record]);
        assert_eq!(stats.day(next_day).distracting, 60);
        assert_eq!(stats.day(day).total(), 0);
    }
}
