use std::{io::Write, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    engine::{session::StartOutcome, storage::entities::ActivityKind},
    utils::{
        clock::Clock,
        time::{format_with_units, parse_duration_fields},
    },
};

use super::{
    dates::{parse_day, DATE_HELP},
    output::status_line,
    shutdown::detect_shutdown,
    CliTracker,
};

const FOLLOW_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
pub struct StopCommand {
    #[arg(value_enum, ignore_case = true, help = "Activity the session is assigned to")]
    category: ActivityKind,
}

#[derive(Debug, Parser)]
pub struct StatusCommand {
    #[arg(short, long, help = "Keep updating the status every second until Ctrl-C")]
    follow: bool,
}

#[derive(Debug, Parser)]
pub struct EditCommand {
    #[arg(value_enum, ignore_case = true)]
    category: ActivityKind,
    #[arg(short, long, help = DATE_HELP)]
    date: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    hours: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    minutes: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    seconds: Option<String>,
}

pub async fn process_start_command(tracker: &mut CliTracker) -> Result<()> {
    let discarded = tracker.live_elapsed_seconds();
    match tracker.start().await? {
        StartOutcome::Started => {
            if discarded > 0 {
                println!(
                    "Discarded the previous session of {}",
                    format_with_units(discarded)
                );
            }
            println!("Tracking started");
        }
        StartOutcome::IndicatorDenied => {
            eprintln!("Couldn't show that a session is running, the session was not started");
        }
    }
    Ok(())
}

pub async fn process_stop_command(
    tracker: &mut CliTracker,
    StopCommand { category }: StopCommand,
) -> Result<()> {
    match tracker.stop(category).await? {
        Some(record) => println!(
            "Saved {} of {} on {}",
            format_with_units(record.duration_seconds),
            record.category,
            record.date
        ),
        None => println!("Nothing to save"),
    }
    Ok(())
}

pub async fn process_edit_command(
    tracker: &mut CliTracker,
    clock: Arc<dyn Clock>,
    EditCommand {
        category,
        date,
        hours,
        minutes,
        seconds,
    }: EditCommand,
) -> Result<()> {
    let date = parse_day(date.as_deref(), clock.time(), tracker.logical_date())?;
    let total = parse_duration_fields(
        hours.as_deref().unwrap_or_default(),
        minutes.as_deref().unwrap_or_default(),
        seconds.as_deref().unwrap_or_default(),
    );

    match tracker.overwrite_category_total(category, date, total).await? {
        Some(record) => println!(
            "{} on {} is now {}",
            record.category,
            record.date,
            format_with_units(record.duration_seconds)
        ),
        None => println!("Removed {category} from {date}"),
    }
    Ok(())
}

pub async fn process_status_command(
    tracker: &mut CliTracker,
    clock: Arc<dyn Clock>,
    StatusCommand { follow }: StatusCommand,
) -> Result<()> {
    if !follow {
        println!("{}", current_status(tracker).await?);
        return Ok(());
    }

    let cancellation = CancellationToken::new();
    tokio::spawn(detect_shutdown(cancellation.clone()));

    let mut stdout = std::io::stdout();
    loop {
        // Another process may have started or stopped the session, and the day may have changed
        tracker.check_date_rollover().await?;
        tracker.sync_timer_state().await?;
        write!(stdout, "\r\x1b[2K{}", current_status(tracker).await?)?;
        stdout.flush()?;

        select! {
            _ = cancellation.cancelled() => {
                debug!("Status display cancelled");
                break;
            },
            _ = clock.sleep(FOLLOW_TICK) => {},
        }
    }
    if let Err(e) = writeln!(stdout) {
        warn!("Failed to finish status line {e}");
    }
    Ok(())
}

async fn current_status(tracker: &CliTracker) -> Result<String> {
    Ok(status_line(
        &tracker.timer_state(),
        tracker.live_elapsed_seconds(),
        tracker.today_total().await?,
        tracker.settings().target_seconds,
    ))
}
