use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use anyhow::Result;
use chrono::{Datelike, Months, NaiveDate};

use crate::usage::AppUsage;

use super::{
    error::EngineError,
    storage::entities::{ActivityKind, TimeRecord},
};

/// Where a piece of the breakdown comes from. Activities timed by the user and apps reported by the
/// usage feed never share a key, even when a label looks like an activity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsageSource {
    Activity(ActivityKind),
    App(Arc<str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageShare {
    pub source: UsageSource,
    pub seconds: u64,
}

pub fn daily_total<'a>(records: impl IntoIterator<Item = &'a TimeRecord>) -> u64 {
    records.into_iter().map(|v| v.duration_seconds).sum()
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(EngineError::InvalidMonth { year, month })?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|v| v.pred_opt())
        .ok_or(EngineError::InvalidMonth { year, month })?;
    Ok((first, last))
}

/// Ratio of every day total to `target_seconds` for the days of the month that have time recorded.
/// Days without time are absent, and a target of 0 makes every ratio 0.
pub fn monthly_progress(
    records: &[TimeRecord],
    year: i32,
    month: u32,
    target_seconds: u64,
) -> Result<BTreeMap<NaiveDate, f64>> {
    month_bounds(year, month)?;

    let mut totals = BTreeMap::<NaiveDate, u64>::new();
    for record in records
        .iter()
        .filter(|v| v.date.year() == year && v.date.month() == month)
    {
        *totals.entry(record.date).or_default() += record.duration_seconds;
    }

    Ok(totals
        .into_iter()
        .filter(|(_, total)| *total > 0)
        .map(|(date, total)| {
            let ratio = if target_seconds == 0 {
                0.0
            } else {
                total as f64 / target_seconds as f64
            };
            (date, ratio)
        })
        .collect())
}

/// Sums records per activity and app usage per label. Zero totals are dropped and the rest is sorted
/// by time, largest first. Equal totals keep the order in which they were first seen, records
/// before apps.
pub fn category_breakdown(records: &[TimeRecord], apps: &[AppUsage]) -> Vec<UsageShare> {
    let mut index = HashMap::<UsageSource, usize>::new();
    let mut shares = Vec::<UsageShare>::new();

    let sources = records
        .iter()
        .map(|v| (UsageSource::Activity(v.category), v.duration_seconds))
        .chain(
            apps.iter()
                .map(|v| (UsageSource::App(v.label.clone()), v.seconds)),
        );

    for (source, seconds) in sources {
        match index.get(&source) {
            Some(&i) => shares[i].seconds += seconds,
            None => {
                index.insert(source.clone(), shares.len());
                shares.push(UsageShare { source, seconds });
            }
        }
    }

    shares.retain(|v| v.seconds > 0);
    shares.sort_by(|a, b| b.seconds.cmp(&a.seconds));
    shares
}

pub fn breakdown_total(shares: &[UsageShare]) -> u64 {
    shares.iter().map(|v| v.seconds).sum()
}
