use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Fresh,
    Stale { loaded: NaiveDate, today: NaiveDate },
}

/// Keeps the date the engine treats as today. It only moves when [DayRollover::advance] is called,
/// so a running process keeps showing the day it was opened on until it checks.
#[derive(Debug, Clone)]
pub struct DayRollover {
    loaded: NaiveDate,
}

impl DayRollover {
    pub fn new(today: NaiveDate) -> Self {
        Self { loaded: today }
    }

    pub fn logical_date(&self) -> NaiveDate {
        self.loaded
    }

    pub fn state(&self, today: NaiveDate) -> DayState {
        if self.loaded == today {
            DayState::Fresh
        } else {
            DayState::Stale {
                loaded: self.loaded,
                today,
            }
        }
    }

    pub fn advance(&mut self, today: NaiveDate) {
        self.loaded = today;
    }
}
