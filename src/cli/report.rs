use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Days, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;
use tracing::warn;

use crate::{storage::state_store::auth_credential, utils::time::date_to_key};

use super::{
    output::{print_report, report::ReportSummary},
    Args, CliContext,
};

/// Days covered when no start is given, today included.
const DEFAULT_REPORT_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "start",
        short,
        help = "First day of the report. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day of the report, inclusive. Defaults to today"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long,
        help = "Only use sessions recorded on this machine, even when logged in"
    )]
    local: bool,
}

/// Whole local days the report spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReportRange {
    start: DateTime<Local>,
    end: DateTime<Local>,
}

impl ReportRange {
    fn title(&self) -> String {
        format!(
            "Report {} - {}",
            date_to_key(self.start.date_naive()),
            date_to_key(self.end.date_naive())
        )
    }
}

/// Command to process `report` command. Totals come from the aggregator when logged in, and from
/// the local ledger otherwise.
pub async fn process_report_command(context: &CliContext, command: ReportCommand) -> Result<()> {
    let range = parse_range(
        command.start_date,
        command.end_date,
        command.date_style,
        Local::now(),
    )?;

    let token = if command.local {
        None
    } else {
        auth_credential(context.store.as_ref()).await?
    };

    if let Some(token) = token {
        match context
            .client
            .report(&token, range.start.date_naive(), range.end.date_naive())
            .await
        {
            Ok(reports) => {
                print_report(&range.title(), &ReportSummary::from_remote(&reports));
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to fetch report: {e:?}");
                println!("Activity service unavailable, using sessions recorded locally.\n");
            }
        }
    }

    let records = context.sync.records().await?;
    let summary = ReportSummary::from_sessions(
        records.iter().map(|record| &record.session),
        range.start.with_timezone(&Utc),
        range.end.with_timezone(&Utc),
    );
    print_report(&format!("{} (local)", range.title()), &summary);
    Ok(())
}

/// Also provides sensible defaults for `report` command. The result is widened to whole days.
fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    now: DateTime<Local>,
) -> Result<ReportRange> {
    let dialect: chrono_english::Dialect = date_style.into();

    let end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    let start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => end
            .checked_sub_days(Days::new(DEFAULT_REPORT_DAYS - 1))
            .unwrap_or(end),
    };

    if start > end {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "Start of the report is after its end",
            )
            .into());
    }

    Ok(ReportRange {
        start: start.beginning_of_day(),
        end: end.end_of_day(),
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Local, NaiveDate, TimeZone};

    use super::{parse_range, DateStyle};

    #[test]
    fn test_default_range_is_last_week() -> Result<()> {
        let now = Local
            .with_ymd_and_hms(2025, 3, 16, 15, 30, 0)
            .single()
            .unwrap();
        let range = parse_range(None, None, DateStyle::Uk, now)?;

        assert_eq!(
            range.start.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
        assert_eq!(range.end.date_naive(), now.date_naive());
        assert_eq!(range.title(), "Report 2025-03-10 - 2025-03-16");
        Ok(())
    }

    #[test]
    fn test_explicit_range() -> Result<()> {
        let now = Local
            .with_ymd_and_hms(2025, 3, 16, 15, 30, 0)
            .single()
            .unwrap();
        let range = parse_range(
            Some("01/03/2025".into()),
            Some("02/03/2025".into()),
            DateStyle::Uk,
            now,
        )?;
        assert_eq!(
            range.start.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert_eq!(
            range.end.date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );

        let us = parse_range(Some("03/01/2025".into()), None, DateStyle::Us, now)?;
        assert_eq!(us.start.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        Ok(())
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let now = Local
            .with_ymd_and_hms(2025, 3, 16, 15, 30, 0)
            .single()
            .unwrap();
        assert!(parse_range(Some("tomorrow".into()), Some("yesterday".into()), DateStyle::Uk, now).is_err());
        assert!(parse_range(Some("not a date at all".into()), None, DateStyle::Uk, now).is_err());
    }
}
