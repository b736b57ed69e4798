use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use sysinfo::{get_current_pid, System};
use tracing::debug;

use crate::utils::clock::Clock;

use super::{AppUsage, UsageFeed};

/// Usage at or below this many seconds is noise from short lived processes.
const MIN_USAGE_SECONDS: u64 = 1;

/// Counts the time processes have been alive during the window. Only processes that were launched
/// from an executable are taken into account, kernel and userland threads are skipped.
pub struct SystemUsageFeed {
    clock: Arc<dyn Clock>,
}

impl SystemUsageFeed {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl UsageFeed for SystemUsageFeed {
    async fn query_usage(
        &self,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<Result<AppUsage>>> {
        let now = self.clock.time().timestamp();
        let (from, to) = (from.timestamp(), to.timestamp());

        tokio::task::spawn_blocking(move || {
            let current_pid = get_current_pid().map_err(|e| anyhow!(e))?;
            let system = System::new_all();

            let usage = system
                .processes()
                .iter()
                .filter(|(pid, process)| {
                    **pid != current_pid
                        && process.thread_kind().is_none()
                        && process.exe().is_some()
                })
                .filter_map(|(pid, process)| {
                    let seconds = lifetime_overlap(process.start_time() as i64, now, from, to);
                    if seconds == 0 {
                        return None;
                    }
                    let label = match process.name().to_str() {
                        Some(v) => v,
                        None => {
                            return Some(Err(anyhow!(
                                "Process {pid} has a name that isn't valid UTF-8"
                            )))
                        }
                    };
                    Some(Ok(AppUsage {
                        label: label.into(),
                        seconds,
                    }))
                })
                .collect::<Vec<_>>();
            let usage = collapse_by_label(usage);
            debug!("Collected {} usage entries", usage.len());
            Ok::<_, anyhow::Error>(usage)
        })
        .await?
    }
}

/// Keeps one entry per label. Processes sharing a name run side by side, so the longest lived one
/// stands for the app instead of their sum.
fn collapse_by_label(entries: Vec<Result<AppUsage>>) -> Vec<Result<AppUsage>> {
    let mut longest = BTreeMap::<Arc<str>, u64>::new();
    let mut failed = Vec::<Result<AppUsage>>::new();
    for entry in entries {
        match entry {
            Ok(usage) => {
                let seconds = longest.entry(usage.label).or_default();
                *seconds = (*seconds).max(usage.seconds);
            }
            Err(e) => failed.push(Err(e)),
        }
    }

    longest
        .into_iter()
        .filter(|(_, seconds)| *seconds > MIN_USAGE_SECONDS)
        .map(|(label, seconds)| Ok(AppUsage { label, seconds }))
        .chain(failed)
        .collect()
}

/// Seconds during which a process alive from `started` to `alive_until` overlaps the window.
fn lifetime_overlap(started: i64, alive_until: i64, from: i64, to: i64) -> u64 {
    let start = started.max(from);
    let end = alive_until.min(to);
    (end - start).max(0) as u64
}
