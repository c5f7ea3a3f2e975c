pub mod report;

use ansi_term::{Colour, Style};
use chrono::Local;
use report::ReportSummary;

use crate::{
    remote::types::{BlockEntry, RemoteSession},
    sync::{daily_stats::CategoryTotals, ledger::LedgerRecord},
    tracker::session::{Category, OpenSession},
    utils::{percentage::share_percentage, time::format_seconds},
};

const NOT_AVAILABLE: &str = "N/A";

pub fn category_style(category: Category) -> Style {
    match category {
        Category::Productive => Colour::Green.normal(),
        Category::Neutral => Colour::Blue.normal(),
        Category::Distracting => Colour::Red.normal(),
    }
}

fn painted_category(category: Category) -> String {
    category_style(category)
        .paint(format!("{:<12}", category.to_string()))
        .to_string()
}

pub fn print_current(session: Option<&OpenSession>, tracking_enabled: bool) {
    let tracking = if tracking_enabled {
        Colour::Green.paint("enabled")
    } else {
        Colour::Yellow.paint("disabled")
    };
    println!("Tracking\t{tracking}");

    match session {
        Some(session) => println!(
            "Current\t\t{} {} since {}",
            painted_category(session.category),
            session.domain,
            session.start_time.with_timezone(&Local).format("%x %H:%M:%S")
        ),
        None => println!("Current\t\tnone"),
    }
}

pub fn print_totals(date: &str, totals: &CategoryTotals) {
    println!("{}", Style::new().bold().paint(format!("Today ({date})")));
    for category in Category::ALL {
        let seconds = totals.get(category);
        let share = share_percentage(seconds, totals.total())
            .map(|share| share.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.into());
        println!(
            "{}\t{}\t{}",
            painted_category(category),
            format_seconds(seconds),
            share
        );
    }
    println!("Total\t\t{}", format_seconds(totals.total()));
}

pub fn print_report(title: &str, summary: &ReportSummary) {
    println!("{}", Style::new().bold().paint(title));
    if summary.is_empty() {
        println!("No activity recorded in this period.");
        return;
    }

    for category in Category::ALL {
        let usage = summary.usage(category);
        println!(
            "{}\t{}\t{} sessions",
            painted_category(category),
            format_seconds(usage.seconds),
            usage.sessions
        );
    }
    println!();
    println!("Total tracked time\t{}", format_seconds(summary.total_time()));
    println!(
        "Productivity ratio\t{}",
        summary
            .productivity_ratio()
            .map(|ratio| ratio.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    );
    println!(
        "Average session\t\t{}",
        summary
            .average_session()
            .map(format_seconds)
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    );
}

pub fn print_block_list(entries: &[BlockEntry]) {
    if entries.is_empty() {
        println!("No blocked sites.");
        return;
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}\t{}",
            entry.id.as_deref().unwrap_or("-"),
            entry.domain,
            entry
                .category
                .map(|category| category.to_string())
                .unwrap_or_else(|| "-".into()),
            entry.block_duration
        );
    }
}

pub fn print_remote_sessions(sessions: &[RemoteSession]) {
    for session in sessions {
        println!(
            "{}\t{}\t{}\t{}",
            session.start_time.with_timezone(&Local).format("%x %H:%M:%S"),
            painted_category(session.category),
            session
                .duration
                .map(format_seconds)
                .unwrap_or_else(|| NOT_AVAILABLE.into()),
            session.domain
        );
    }
}

pub fn print_ledger(records: &[&LedgerRecord]) {
    for record in records {
        let session = &record.session;
        let delivered = if record.delivered {
            Colour::Green.paint("synced")
        } else {
            Colour::Yellow.paint("local")
        };
        println!(
            "{}\t{}\t{}\t{}\t{}",
            session.start_time.with_timezone(&Local).format("%x %H:%M:%S"),
            painted_category(session.category),
            format_seconds(session.duration),
            delivered,
            session.domain
        );
    }
}
