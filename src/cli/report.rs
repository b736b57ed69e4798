use std::sync::Arc;

use anyhow::Result;
use chrono::Datelike;
use clap::Parser;
use tracing::warn;

use crate::{
    engine::{
        aggregate::{breakdown_total, category_breakdown, daily_total},
        storage::entities::ActivityKind,
    },
    utils::{
        clock::Clock,
        percentage::seconds_percentage,
        time::{format_target, format_with_units},
    },
};

use super::{
    dates::{parse_day, DATE_HELP},
    output::{paint_progress, share_line},
    CliTracker,
};

#[derive(Debug, Parser)]
pub struct TodayCommand {
    #[arg(short, long, help = DATE_HELP)]
    date: Option<String>,
}

#[derive(Debug, Parser)]
pub struct MonthCommand {
    #[arg(short, long, help = "Year of the month. Defaults to the current one")]
    year: Option<i32>,
    #[arg(short, long, help = "Month number from 1 to 12. Defaults to the current one")]
    month: Option<u32>,
}

#[derive(Debug, Parser)]
pub struct BreakdownCommand {
    #[arg(long, help = "Leave out app usage reported by the system")]
    no_apps: bool,
}

pub async fn process_today_command(
    tracker: &CliTracker,
    clock: Arc<dyn Clock>,
    TodayCommand { date }: TodayCommand,
) -> Result<()> {
    let date = parse_day(date.as_deref(), clock.time(), tracker.logical_date())?;
    let records = tracker.records_for(date).await?;
    let total = daily_total(&records);
    let target = tracker.settings().target_seconds;

    println!("{date}");
    for record in &records {
        println!(
            "{}\t{}\t{}",
            seconds_percentage(record.duration_seconds, total),
            format_with_units(record.duration_seconds),
            record.category
        );
    }
    println!(
        "Total {} of {}\t{}",
        format_with_units(total),
        format_target(target),
        paint_progress(total as f64 / target.max(1) as f64)
    );
    Ok(())
}

pub async fn process_month_command(
    tracker: &CliTracker,
    MonthCommand { year, month }: MonthCommand,
) -> Result<()> {
    let today = tracker.logical_date();
    let year = year.unwrap_or(today.year());
    let month = month.unwrap_or(today.month());

    let progress = tracker.monthly_progress(year, month).await?;
    if progress.is_empty() {
        println!("No time recorded in {year}-{month:02}");
        return Ok(());
    }
    for (date, ratio) in progress {
        println!("{}\t{}", date.format("%a %d"), paint_progress(ratio));
    }
    Ok(())
}

pub async fn process_breakdown_command(
    tracker: &mut CliTracker,
    BreakdownCommand { no_apps }: BreakdownCommand,
) -> Result<()> {
    let shares = if no_apps {
        let records = tracker.records_for(tracker.logical_date()).await?;
        category_breakdown(&records, &[])
    } else {
        if let Err(e) = tracker.refresh_external_usage().await {
            warn!("Failed to read app usage {e:?}");
            eprintln!("App usage is not available, showing activities only");
        }
        let views = tracker.views();
        let shares = views.breakdown.borrow().clone();
        shares
    };

    let total = breakdown_total(&shares);
    for share in &shares {
        println!("{}", share_line(share, total));
    }
    println!("Total {}", format_with_units(total));
    Ok(())
}

pub fn print_categories() {
    for kind in ActivityKind::ALL.iter().filter(|v| !v.is_empty()) {
        println!("{}\t{}", kind.identifier().to_lowercase(), kind.display_name());
    }
}
