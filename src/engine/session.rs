use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::utils::{clock::Clock, time::day_start};

use super::{
    error::EngineError,
    indicator::ActivityIndicator,
    settings::RolloverPolicy,
    storage::{
        entities::{ActivityKind, TimeRecord, TimerState},
        record_storage::RecordStorage,
        timer_state::{TimerStateStorage, TimerStateStore},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The ongoing activity indicator was refused, so the session was rolled back.
    IndicatorDenied,
}

/// Times a single session. Elapsed time is always derived from the monotonic clock and the
/// persisted start reference, never from the wall clock.
pub struct SessionTimer<S> {
    state: TimerStateStore<S>,
    indicator: Box<dyn ActivityIndicator>,
    clock: Arc<dyn Clock>,
}

impl<S: TimerStateStorage> SessionTimer<S> {
    pub fn new(
        state: TimerStateStore<S>,
        indicator: Box<dyn ActivityIndicator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            indicator,
            clock,
        }
    }

    /// Starts a new session counting towards `date`. A session that is already running is replaced
    /// and its progress is lost.
    #[instrument(skip(self))]
    pub async fn start(&mut self, date: NaiveDate) -> Result<StartOutcome> {
        let now = self.clock.monotonic_ms();
        let state = self
            .state
            .replace(TimerState::started_at(now).on(date))
            .await?;
        info!("Session started at {now}");

        let since = self.chronometer_base(&state);
        match self.indicator.start(since) {
            Ok(()) => Ok(StartOutcome::Started),
            Err(e) => {
                warn!("Ongoing activity indicator was refused, rolling back: {e:?}");
                self.state
                    .update(|state| {
                        state.tracking = false;
                        state.session_start_ms = None;
                    })
                    .await?;
                Ok(StartOutcome::IndicatorDenied)
            }
        }
    }

    /// Ends the session and commits its whole seconds to `date` under `category`. The timer is
    /// reset even when there was nothing to commit. The timer is cleared before the record is
    /// written, so a stop that is retried after a failure can't commit the same session twice. If
    /// the record can't be stored the timer is put back as it was.
    #[instrument(skip(self, records))]
    pub async fn stop<R: RecordStorage>(
        &mut self,
        category: ActivityKind,
        date: NaiveDate,
        records: &R,
    ) -> Result<Option<TimeRecord>> {
        if category.is_empty() {
            return Err(EngineError::EmptyCategory.into());
        }

        let state = self.state.load().await?;
        let seconds = state.live_elapsed_seconds(self.clock.monotonic_ms());

        self.state.clear_all().await?;

        let committed = if seconds > 0 {
            let record = TimeRecord::new(date, category, seconds);
            if let Err(e) = records.upsert(record.clone()).await {
                warn!("Failed to commit {seconds}s of {category}, restoring the timer: {e:?}");
                self.state.replace(state).await?;
                return Err(e);
            }
            info!("Committed {seconds}s of {category} to {date}");
            Some(record)
        } else {
            debug!("Nothing to commit");
            None
        };

        if let Err(e) = self.indicator.stop() {
            warn!("Failed to stop ongoing activity indicator {e:?}");
        }
        Ok(committed)
    }

    /// Applies what the change of the day to `today` does to the timer. A running session is moved
    /// to `today` with every policy.
    pub async fn apply_rollover(
        &mut self,
        policy: RolloverPolicy,
        today: NaiveDate,
    ) -> Result<TimerState> {
        let state = match policy {
            RolloverPolicy::ResetAccumulated => {
                self.state
                    .update(move |state| {
                        state.accumulated_ms = 0;
                        move_to_day(state, today);
                    })
                    .await?
            }
            RolloverPolicy::RestartSession => {
                let midnight = self.midnight_ms(today);
                let state = self
                    .state
                    .update(move |state| {
                        state.accumulated_ms = 0;
                        if state.tracking {
                            let start = state.session_start_ms.unwrap_or(0).max(midnight);
                            state.session_start_ms = Some(start);
                        }
                        move_to_day(state, today);
                    })
                    .await?;
                if state.tracking {
                    let since = self.chronometer_base(&state);
                    if let Err(e) = self.indicator.start(since) {
                        warn!("Failed to restart ongoing activity indicator {e:?}");
                    }
                }
                state
            }
            RolloverPolicy::CarryOver => {
                self.state
                    .update(move |state| move_to_day(state, today))
                    .await?
            }
        };
        Ok(state)
    }

    pub fn live_elapsed_seconds(&self) -> u64 {
        self.state
            .current()
            .live_elapsed_seconds(self.clock.monotonic_ms())
    }

    pub fn live_elapsed(&self) -> LiveElapsed {
        LiveElapsed {
            state: self.state.subscribe(),
            clock: self.clock.clone(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state.subscribe()
    }

    /// Rereads the durable timer state.
    pub async fn reload(&self) -> Result<TimerState> {
        self.state.load().await
    }

    /// Monotonic time of the local midnight that started `today`. Never later than now.
    fn midnight_ms(&self, today: NaiveDate) -> u64 {
        let now = self.clock.monotonic_ms();
        let since_midnight = (self.clock.time() - day_start(today))
            .num_milliseconds()
            .max(0) as u64;
        now.saturating_sub(since_midnight)
    }

    /// Wall clock moment from which a chronometer has to count to show the elapsed time.
    fn chronometer_base(&self, state: &TimerState) -> chrono::DateTime<chrono::Local> {
        let elapsed = state.live_elapsed_ms(self.clock.monotonic_ms());
        self.clock.time() - Duration::milliseconds(elapsed as i64)
    }
}

fn move_to_day(state: &mut TimerState, today: NaiveDate) {
    if state.tracking {
        state.session_date = Some(today);
    }
}

/// Handle for display surfaces. Every sample is recomputed from the monotonic clock, so it can be
/// polled at any rate.
#[derive(Clone)]
pub struct LiveElapsed {
    state: watch::Receiver<TimerState>,
    clock: Arc<dyn Clock>,
}

impl LiveElapsed {
    pub fn seconds(&self) -> u64 {
        let state = *self.state.borrow();
        state.live_elapsed_seconds(self.clock.monotonic_ms())
    }

    pub fn tracking(&self) -> bool {
        self.state.borrow().tracking
    }

    /// Waits until the timer state changes.
    pub async fn changed(&mut self) -> Result<()> {
        self.state.changed().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::{
        engine::{
            indicator::MockActivityIndicator,
            storage::{record_storage::RecordStorageImpl, timer_state::FileTimerStateStorage},
        },
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
    };

    const TODAY: NaiveDate = NaiveDate::from_ymd_opt(2025, 5, 20).unwrap();
    const T0: u64 = 3_600_000;

    struct Fixture {
        dir: TempDir,
        clock: ManualClock,
        records: RecordStorageImpl,
        timer: SessionTimer<FileTimerStateStorage>,
    }

    fn accepting_indicator() -> MockActivityIndicator {
        let mut indicator = MockActivityIndicator::new();
        indicator.expect_start().returning(|_| Ok(()));
        indicator.expect_stop().returning(|| Ok(()));
        indicator
    }

    async fn open_timer(
        dir: &TempDir,
        clock: &ManualClock,
        indicator: MockActivityIndicator,
    ) -> Result<SessionTimer<FileTimerStateStorage>> {
        let storage = FileTimerStateStorage::new(dir.path().join("timer_state.json"));
        Ok(SessionTimer::new(
            TimerStateStore::open(storage).await?,
            Box::new(indicator),
            Arc::new(clock.clone()),
        ))
    }

    async fn fixture(indicator: MockActivityIndicator) -> Result<Fixture> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = ManualClock::new(TODAY, T0);
        let records = RecordStorageImpl::new(dir.path().join("records"))?;
        let timer = open_timer(&dir, &clock, indicator).await?;
        Ok(Fixture {
            dir,
            clock,
            records,
            timer,
        })
    }

    #[tokio::test]
    async fn test_session_of_65_seconds() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;

        assert_eq!(f.timer.start(TODAY).await?, StartOutcome::Started);
        f.clock.advance(Duration::from_millis(65_400));
        let displayed = f.timer.live_elapsed_seconds();

        let record = f
            .timer
            .stop(ActivityKind::Gaming, TODAY, &f.records)
            .await?
            .expect("A record should be committed");

        assert_eq!(displayed, 65);
        assert_eq!(record.duration_seconds, displayed);
        assert_eq!(record.category, ActivityKind::Gaming);
        assert_eq!(record.date, TODAY);
        assert_eq!(f.records.get_data_for(TODAY).await?, vec![record]);
        assert_eq!(f.timer.state(), TimerState::default());
        assert_eq!(f.timer.reload().await?, TimerState::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_start_resets_baseline() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;

        f.timer.start(TODAY).await?;
        f.clock.advance(Duration::from_secs(10));
        f.timer.start(TODAY).await?;

        let state = f.timer.state();
        assert_eq!(state.accumulated_ms, 0);
        assert_eq!(state.session_start_ms, Some(T0 + 10_000));
        assert_eq!(f.timer.live_elapsed_seconds(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_without_start_commits_nothing() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.clock.advance(Duration::from_secs(100));

        let record = f.timer.stop(ActivityKind::Music, TODAY, &f.records).await?;

        assert_eq!(record, None);
        assert!(f.records.get_data_for(TODAY).await?.is_empty());
        assert_eq!(f.timer.state(), TimerState::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_sub_second_session_is_dropped() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.clock.advance(Duration::from_millis(999));

        assert_eq!(
            f.timer.stop(ActivityKind::Music, TODAY, &f.records).await?,
            None
        );
        assert_eq!(f.timer.state(), TimerState::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_indicator_rolls_back() -> Result<()> {
        let mut indicator = MockActivityIndicator::new();
        indicator
            .expect_start()
            .times(1)
            .returning(|_| Err(anyhow!("notifications are disabled")));
        indicator.expect_stop().returning(|| Ok(()));
        let mut f = fixture(indicator).await?;

        assert_eq!(f.timer.start(TODAY).await?, StartOutcome::IndicatorDenied);
        let state = f.timer.reload().await?;
        assert!(!state.tracking);
        assert_eq!(state.session_start_ms, None);

        f.clock.advance(Duration::from_secs(30));
        assert_eq!(f.timer.live_elapsed_seconds(), 0);
        assert_eq!(
            f.timer.stop(ActivityKind::Art, TODAY, &f.records).await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_category_is_rejected() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.clock.advance(Duration::from_secs(5));

        let error = f
            .timer
            .stop(ActivityKind::Empty, TODAY, &f.records)
            .await
            .unwrap_err();

        assert_eq!(
            error.downcast_ref::<EngineError>(),
            Some(&EngineError::EmptyCategory)
        );
        assert!(f.timer.reload().await?.tracking);
        assert!(f.records.get_data_for(TODAY).await?.is_empty());
        Ok(())
    }

    struct BrokenRecords;

    impl RecordStorage for BrokenRecords {
        async fn upsert(&self, _record: TimeRecord) -> Result<()> {
            Err(anyhow!("disk is full"))
        }

        async fn delete_by_category_and_date(
            &self,
            _category: ActivityKind,
            _date: NaiveDate,
        ) -> Result<usize> {
            Err(anyhow!("disk is full"))
        }

        async fn get_data_for(&self, _date: NaiveDate) -> Result<Vec<TimeRecord>> {
            Ok(vec![])
        }

        async fn get_data_between(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<TimeRecord>> {
            Ok(vec![])
        }

        async fn overwrite_category_total(
            &self,
            _category: ActivityKind,
            _date: NaiveDate,
            _total_seconds: u64,
        ) -> Result<Option<TimeRecord>> {
            Err(anyhow!("disk is full"))
        }
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_session() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.clock.advance(Duration::from_secs(20));

        assert!(f
            .timer
            .stop(ActivityKind::Reading, TODAY, &BrokenRecords)
            .await
            .is_err());

        assert_eq!(
            f.timer.reload().await?,
            TimerState::started_at(T0).on(TODAY)
        );
        assert_eq!(f.timer.live_elapsed_seconds(), 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_session_survives_restart() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        drop(f.timer);

        f.clock.advance(Duration::from_secs(90));
        let mut timer = open_timer(&f.dir, &f.clock, accepting_indicator()).await?;

        assert_eq!(timer.live_elapsed_seconds(), 90);
        let record = timer
            .stop(ActivityKind::Podcast, TODAY, &f.records)
            .await?
            .expect("Session should be restored");
        assert_eq!(record.duration_seconds, 90);
        Ok(())
    }

    #[tokio::test]
    async fn test_live_elapsed_handle_follows_timer() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        let mut live = f.timer.live_elapsed();
        assert!(!live.tracking());

        f.timer.start(TODAY).await?;
        live.changed().await?;
        f.clock.advance(Duration::from_secs(3));

        assert!(live.tracking());
        assert_eq!(live.seconds(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_rollover_policies() -> Result<()> {
        let tomorrow = TODAY.succ_opt().unwrap();
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.timer
            .state
            .update(|state| state.accumulated_ms = 4_000)
            .await?;
        f.clock.advance(Duration::from_secs(10));

        let state = f
            .timer
            .apply_rollover(RolloverPolicy::CarryOver, tomorrow)
            .await?;
        assert_eq!(state.live_elapsed_seconds(T0 + 10_000), 14);
        assert_eq!(state.session_date, Some(tomorrow));

        let state = f
            .timer
            .apply_rollover(RolloverPolicy::ResetAccumulated, tomorrow)
            .await?;
        assert_eq!(state.accumulated_ms, 0);
        assert_eq!(state.session_start_ms, Some(T0));
        assert_eq!(f.timer.live_elapsed_seconds(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_session_counts_from_midnight() -> Result<()> {
        let tomorrow = TODAY.succ_opt().unwrap();
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.timer
            .state
            .update(|state| state.accumulated_ms = 4_000)
            .await?;

        // Noon of the next day, twelve hours after its midnight
        f.clock.advance(Duration::from_secs(13 * 3600));
        f.clock.set_today(tomorrow);

        let state = f
            .timer
            .apply_rollover(RolloverPolicy::RestartSession, tomorrow)
            .await?;

        assert!(state.tracking);
        assert_eq!(state.accumulated_ms, 0);
        assert_eq!(state.session_start_ms, Some(T0 + 3600 * 1000));
        assert_eq!(state.session_date, Some(tomorrow));
        assert_eq!(f.timer.live_elapsed_seconds(), 12 * 3600);
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_session_keeps_start_after_midnight() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        f.timer.start(TODAY).await?;
        f.clock.advance(Duration::from_secs(10));

        let state = f
            .timer
            .apply_rollover(RolloverPolicy::RestartSession, TODAY)
            .await?;

        assert_eq!(state.session_start_ms, Some(T0));
        assert_eq!(f.timer.live_elapsed_seconds(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_rollover_leaves_idle_timer_alone() -> Result<()> {
        let mut f = fixture(accepting_indicator()).await?;
        let state = f
            .timer
            .apply_rollover(RolloverPolicy::RestartSession, TODAY.succ_opt().unwrap())
            .await?;
        assert_eq!(state, TimerState::default());
        Ok(())
    }

    /// Timer storage whose writes can be switched off.
    struct FlakyTimerStorage {
        inner: FileTimerStateStorage,
        failing: Arc<AtomicBool>,
    }

    impl TimerStateStorage for FlakyTimerStorage {
        async fn load(&self) -> Result<TimerState> {
            self.inner.load().await
        }

        async fn update<F>(&self, change: F) -> Result<TimerState>
        where
            F: FnOnce(&mut TimerState) + Send,
        {
            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow!("read only file system"));
            }
            self.inner.update(change).await
        }
    }

    #[tokio::test]
    async fn test_retried_stop_commits_once() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = ManualClock::new(TODAY, T0);
        let records = RecordStorageImpl::new(dir.path().join("records"))?;
        let failing = Arc::new(AtomicBool::new(false));
        let storage = FlakyTimerStorage {
            inner: FileTimerStateStorage::new(dir.path().join("timer_state.json")),
            failing: failing.clone(),
        };
        let mut timer = SessionTimer::new(
            TimerStateStore::open(storage).await?,
            Box::new(accepting_indicator()),
            Arc::new(clock.clone()),
        );

        timer.start(TODAY).await?;
        clock.advance(Duration::from_secs(40));

        failing.store(true, Ordering::SeqCst);
        assert!(timer
            .stop(ActivityKind::Hobby, TODAY, &records)
            .await
            .is_err());
        assert!(records.get_data_for(TODAY).await?.is_empty());
        assert!(timer.reload().await?.tracking);

        failing.store(false, Ordering::SeqCst);
        timer.stop(ActivityKind::Hobby, TODAY, &records).await?;
        assert_eq!(timer.stop(ActivityKind::Hobby, TODAY, &records).await?, None);

        let committed = records.get_data_for(TODAY).await?;
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].duration_seconds, 40);
        Ok(())
    }
}
