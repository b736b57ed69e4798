//! Timing engine. Everything that changes state goes through [Tracker], which owns the stores, the
//! session timer and the date that counts as today. Display surfaces only read the [TrackerViews].

pub mod aggregate;
pub mod error;
pub mod indicator;
pub mod rollover;
pub mod session;
pub mod settings;
pub mod storage;

use std::{collections::BTreeMap, sync::Arc};

use aggregate::{category_breakdown, daily_total, month_bounds, monthly_progress, UsageShare};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use error::EngineError;
use indicator::ActivityIndicator;
use rollover::{DayRollover, DayState};
use session::{LiveElapsed, SessionTimer, StartOutcome};
use settings::{snap_target, RolloverPolicy, Settings, SettingsStore};
use storage::{
    entities::{ActivityKind, TimeRecord, TimerState},
    record_storage::RecordStorage,
    timer_state::{TimerStateStorage, TimerStateStore},
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::{
    usage::{AppUsage, UsageFeed},
    utils::{clock::Clock, time::day_start},
};

/// Something the user should be told about that isn't an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The session was not started because the ongoing activity indicator was refused.
    IndicatorDenied,
    DayChanged { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverOutcome {
    Unchanged,
    Rolled { from: NaiveDate, to: NaiveDate },
}

/// Read side of the [Tracker]. Every receiver holds the latest value and is notified once a
/// command changed it.
#[derive(Clone)]
pub struct TrackerViews {
    pub timer_state: watch::Receiver<TimerState>,
    pub live_elapsed: LiveElapsed,
    pub today_records: watch::Receiver<Vec<TimeRecord>>,
    pub month_progress: watch::Receiver<BTreeMap<NaiveDate, f64>>,
    pub app_usage: watch::Receiver<Vec<AppUsage>>,
    pub breakdown: watch::Receiver<Vec<UsageShare>>,
    pub logical_date: watch::Receiver<NaiveDate>,
    pub advisory: watch::Receiver<Option<Advisory>>,
}

struct ViewSenders {
    today_records: watch::Sender<Vec<TimeRecord>>,
    month_progress: watch::Sender<BTreeMap<NaiveDate, f64>>,
    app_usage: watch::Sender<Vec<AppUsage>>,
    breakdown: watch::Sender<Vec<UsageShare>>,
    logical_date: watch::Sender<NaiveDate>,
    advisory: watch::Sender<Option<Advisory>>,
}

impl ViewSenders {
    fn new(logical_date: NaiveDate) -> Self {
        Self {
            today_records: watch::channel(vec![]).0,
            month_progress: watch::channel(BTreeMap::new()).0,
            app_usage: watch::channel(vec![]).0,
            breakdown: watch::channel(vec![]).0,
            logical_date: watch::channel(logical_date).0,
            advisory: watch::channel(None).0,
        }
    }
}

fn publish<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
    sender.send_if_modified(|current| {
        let modified = *current != value;
        *current = value;
        modified
    });
}

pub struct Tracker<R, S> {
    records: R,
    session: SessionTimer<S>,
    rollover: DayRollover,
    usage_feed: Box<dyn UsageFeed>,
    settings: Settings,
    settings_store: SettingsStore,
    clock: Arc<dyn Clock>,
    views: ViewSenders,
}

impl<R: RecordStorage, S: TimerStateStorage> Tracker<R, S> {
    /// Opens the engine on the day of the running session, or on the current day when nothing is
    /// running. A session left over from an earlier day is moved by the next
    /// [Tracker::check_date_rollover]. App usage isn't queried until
    /// [Tracker::refresh_external_usage] is called.
    pub async fn new(
        records: R,
        timer_storage: S,
        indicator: Box<dyn ActivityIndicator>,
        usage_feed: Box<dyn UsageFeed>,
        settings_store: SettingsStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let state = TimerStateStore::open(timer_storage).await?;
        let logical_date = match state.current() {
            TimerState {
                tracking: true,
                session_date: Some(date),
                ..
            } => date,
            _ => clock.today(),
        };
        let settings = settings_store.load().await?;
        let mut tracker = Self {
            records,
            session: SessionTimer::new(state, indicator, clock.clone()),
            rollover: DayRollover::new(logical_date),
            usage_feed,
            settings,
            settings_store,
            clock,
            views: ViewSenders::new(logical_date),
        };
        tracker.refresh_records().await?;
        Ok(tracker)
    }

    pub fn views(&self) -> TrackerViews {
        TrackerViews {
            timer_state: self.session.subscribe(),
            live_elapsed: self.session.live_elapsed(),
            today_records: self.views.today_records.subscribe(),
            month_progress: self.views.month_progress.subscribe(),
            app_usage: self.views.app_usage.subscribe(),
            breakdown: self.views.breakdown.subscribe(),
            logical_date: self.views.logical_date.subscribe(),
            advisory: self.views.advisory.subscribe(),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<StartOutcome> {
        let outcome = self.session.start(self.rollover.logical_date()).await?;
        match outcome {
            StartOutcome::Started => {
                self.views.advisory.send_if_modified(|advisory| {
                    let denied = *advisory == Some(Advisory::IndicatorDenied);
                    if denied {
                        *advisory = None;
                    }
                    denied
                });
            }
            StartOutcome::IndicatorDenied => {
                self.views
                    .advisory
                    .send_replace(Some(Advisory::IndicatorDenied));
            }
        }
        Ok(outcome)
    }

    /// Commits the running session to the logical date.
    #[instrument(skip(self))]
    pub async fn stop(&mut self, category: ActivityKind) -> Result<Option<TimeRecord>> {
        let date = self.rollover.logical_date();
        let record = self.session.stop(category, date, &self.records).await?;
        if record.is_some() {
            self.refresh_records().await?;
        }
        Ok(record)
    }

    /// Replaces whatever was recorded for `category` on `date` with a single record of `seconds`.
    #[instrument(skip(self))]
    pub async fn overwrite_category_total(
        &mut self,
        category: ActivityKind,
        date: NaiveDate,
        seconds: u64,
    ) -> Result<Option<TimeRecord>> {
        if category.is_empty() {
            return Err(EngineError::EmptyCategory.into());
        }
        let record = self
            .records
            .overwrite_category_total(category, date, seconds)
            .await?;
        info!("Total of {category} on {date} set to {seconds}s");
        self.refresh_records().await?;
        Ok(record)
    }

    /// Queries the usage feed for the logical date. Entries the feed couldn't resolve are skipped,
    /// if the whole query fails the previous usage is kept.
    pub async fn refresh_external_usage(&mut self) -> Result<()> {
        let date = self.rollover.logical_date();
        let from = day_start(date);
        let to = match date.succ_opt() {
            Some(next) => self.clock.time().min(day_start(next)),
            None => self.clock.time(),
        };

        let entries = self.usage_feed.query_usage(from, to).await?;
        let usage = entries
            .into_iter()
            .filter_map(|v| {
                v.inspect_err(|e| debug!("Dropping usage entry {e:?}"))
                    .ok()
            })
            .collect::<Vec<_>>();

        publish(&self.views.app_usage, usage);
        self.refresh_breakdown();
        Ok(())
    }

    /// Moves the logical date to the current day if it changed since the last check. The rollover
    /// policy is applied first, so if it fails the date stays where it was and the check can be
    /// retried.
    #[instrument(skip(self))]
    pub async fn check_date_rollover(&mut self) -> Result<RolloverOutcome> {
        let (from, to) = match self.rollover.state(self.clock.today()) {
            DayState::Fresh => return Ok(RolloverOutcome::Unchanged),
            DayState::Stale { loaded, today } => (loaded, today),
        };

        info!(
            "Day changed from {from} to {to}, applying {}",
            self.settings.rollover_policy
        );
        self.session
            .apply_rollover(self.settings.rollover_policy, to)
            .await?;
        self.rollover.advance(to);
        publish(&self.views.logical_date, to);
        self.views
            .advisory
            .send_replace(Some(Advisory::DayChanged { from, to }));

        self.refresh_records().await?;
        if let Err(e) = self.refresh_external_usage().await {
            warn!("Failed to refresh app usage after day change {e:?}");
        }
        Ok(RolloverOutcome::Rolled { from, to })
    }

    /// Sets the daily goal, snapped to 30 minute steps. Returns the stored value.
    pub async fn set_target_seconds(&mut self, seconds: u64) -> Result<u64> {
        let settings = Settings {
            target_seconds: snap_target(seconds),
            ..self.settings
        };
        self.settings_store.save(&settings).await?;
        self.settings = settings;
        info!("Daily target set to {}s", settings.target_seconds);
        self.refresh_records().await?;
        Ok(settings.target_seconds)
    }

    pub async fn set_rollover_policy(&mut self, policy: RolloverPolicy) -> Result<()> {
        let settings = Settings {
            rollover_policy: policy,
            ..self.settings
        };
        self.settings_store.save(&settings).await?;
        self.settings = settings;
        info!("Rollover policy set to {policy}");
        Ok(())
    }

    /// Picks up timer changes made by other processes.
    pub async fn sync_timer_state(&mut self) -> Result<TimerState> {
        self.session.reload().await
    }

    pub async fn records_for(&self, date: NaiveDate) -> Result<Vec<TimeRecord>> {
        self.records.get_data_for(date).await
    }

    pub async fn daily_total(&self, date: NaiveDate) -> Result<u64> {
        Ok(daily_total(&self.records_for(date).await?))
    }

    pub async fn today_total(&self) -> Result<u64> {
        self.daily_total(self.rollover.logical_date()).await
    }

    pub async fn monthly_progress(&self, year: i32, month: u32) -> Result<BTreeMap<NaiveDate, f64>> {
        let (first, last) = month_bounds(year, month)?;
        let records = self.records.get_data_between(first, last).await?;
        monthly_progress(&records, year, month, self.settings.target_seconds)
    }

    pub fn live_elapsed_seconds(&self) -> u64 {
        self.session.live_elapsed_seconds()
    }

    pub fn timer_state(&self) -> TimerState {
        self.session.state()
    }

    pub fn logical_date(&self) -> NaiveDate {
        self.rollover.logical_date()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    async fn refresh_records(&mut self) -> Result<()> {
        let date = self.rollover.logical_date();
        let today = self.records_for(date).await?;
        let progress = self.monthly_progress(date.year(), date.month()).await?;
        publish(&self.views.today_records, today);
        publish(&self.views.month_progress, progress);
        self.refresh_breakdown();
        Ok(())
    }

    fn refresh_breakdown(&self) {
        let breakdown = category_breakdown(
            &self.views.today_records.borrow(),
            &self.views.app_usage.borrow(),
        );
        publish(&self.views.breakdown, breakdown);
    }
}
