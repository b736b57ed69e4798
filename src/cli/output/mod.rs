//! Text shown to the user. Colours follow a calendar heat map: a day is green up to 60% of the
//! target, yellow up to the target and red past it.

use ansi_term::Colour;

use crate::{
    engine::{
        aggregate::{UsageShare, UsageSource},
        storage::entities::TimerState,
    },
    utils::{
        percentage::{seconds_percentage, Percentage},
        time::{format_clock, format_target, format_with_units},
    },
};

const BAR_WIDTH: usize = 20;

pub fn progress_colour(ratio: f64) -> Colour {
    if ratio > 1.0 {
        Colour::Red
    } else if ratio > 0.6 {
        Colour::Yellow
    } else {
        Colour::Green
    }
}

/// `[#######.............]` with the filled part capped at the bar width.
pub fn progress_bar(ratio: f64) -> String {
    let filled = ((ratio.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn paint_progress(ratio: f64) -> String {
    let text = format!("{} {}", progress_bar(ratio), Percentage::from_ratio(ratio));
    progress_colour(ratio).paint(text).to_string()
}

/// Today's progress counts the running session as well as what was already committed.
pub fn status_line(state: &TimerState, elapsed: u64, today_total: u64, target: u64) -> String {
    let (timer, running) = if state.tracking {
        (format!("Tracking {}", format_clock(elapsed)), elapsed)
    } else {
        ("Not tracking".to_string(), 0)
    };
    let used = today_total + running;
    format!(
        "{timer}\tToday {} of {} ({})",
        format_with_units(used),
        format_target(target),
        seconds_percentage(used, target),
    )
}

pub fn share_label(source: &UsageSource) -> String {
    match source {
        UsageSource::Activity(kind) => kind.display_name().to_string(),
        UsageSource::App(label) => format!("{label} (app)"),
    }
}

pub fn share_line(share: &UsageShare, total: u64) -> String {
    format!(
        "{}\t{}\t{}",
        seconds_percentage(share.seconds, total),
        format_with_units(share.seconds),
        share_label(&share.source)
    )
}
