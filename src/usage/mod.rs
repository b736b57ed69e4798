//! Usage statistics reported by the system, as opposed to time the user assigned to an activity by
//! hand.

pub mod system;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};

/// Foreground time of a single app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUsage {
    pub label: Arc<str>,
    pub seconds: u64,
}

/// Source of app usage statistics. The engine takes the reported entries as they are, the feed is
/// the one deciding what counts as an app.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageFeed: Send + Sync {
    /// Usage between `from` and `to`. An entry whose metadata can't be resolved is reported as an
    /// `Err` in place, an error of the whole query means that nothing could be read.
    async fn query_usage(
        &self,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<Result<AppUsage>>>;
}
