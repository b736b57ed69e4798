use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of activities time can be assigned to. [ActivityKind::Empty] is a placeholder for "no
/// activity chosen" and is never committed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Gaming,
    Music,
    Reading,
    Watching,
    Friends,
    Travel,
    Coffee,
    Photo,
    Podcast,
    Movie,
    Shopping,
    Exercise,
    Art,
    Outdoor,
    Hobby,
    Empty,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 16] = [
        ActivityKind::Gaming,
        ActivityKind::Music,
        ActivityKind::Reading,
        ActivityKind::Watching,
        ActivityKind::Friends,
        ActivityKind::Travel,
        ActivityKind::Coffee,
        ActivityKind::Photo,
        ActivityKind::Podcast,
        ActivityKind::Movie,
        ActivityKind::Shopping,
        ActivityKind::Exercise,
        ActivityKind::Art,
        ActivityKind::Outdoor,
        ActivityKind::Hobby,
        ActivityKind::Empty,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityKind::Gaming => "Gaming",
            ActivityKind::Music => "Music",
            ActivityKind::Reading => "Reading",
            ActivityKind::Watching => "Watching",
            ActivityKind::Friends => "Friends",
            ActivityKind::Travel => "Travel",
            ActivityKind::Coffee => "Coffee",
            ActivityKind::Photo => "Photo",
            ActivityKind::Podcast => "Podcast",
            ActivityKind::Movie => "Movie",
            ActivityKind::Shopping => "Shopping",
            ActivityKind::Exercise => "Exercise",
            ActivityKind::Art => "Art",
            ActivityKind::Outdoor => "Outdoor activity",
            ActivityKind::Hobby => "Hobby",
            ActivityKind::Empty => "None",
        }
    }

    /// Name used on disk and on the command line.
    pub fn identifier(&self) -> &'static str {
        match self {
            ActivityKind::Gaming => "GAMING",
            ActivityKind::Music => "MUSIC",
            ActivityKind::Reading => "READING",
            ActivityKind::Watching => "WATCHING",
            ActivityKind::Friends => "FRIENDS",
            ActivityKind::Travel => "TRAVEL",
            ActivityKind::Coffee => "COFFEE",
            ActivityKind::Photo => "PHOTO",
            ActivityKind::Podcast => "PODCAST",
            ActivityKind::Movie => "MOVIE",
            ActivityKind::Shopping => "SHOPPING",
            ActivityKind::Exercise => "EXERCISE",
            ActivityKind::Art => "ART",
            ActivityKind::Outdoor => "OUTDOOR",
            ActivityKind::Hobby => "HOBBY",
            ActivityKind::Empty => "EMPTY",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ActivityKind::Empty)
    }
}

impl Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ActivityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityKind::ALL
            .into_iter()
            .find(|v| v.identifier().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown activity {s}"))
    }
}

/// A finished piece of time assigned to an activity. Records for the same date and category are
/// allowed to coexist and get summed up during aggregation.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TimeRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub category: ActivityKind,
    pub duration_seconds: u64,
}

impl TimeRecord {
    pub fn new(date: NaiveDate, category: ActivityKind, duration_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            category,
            duration_seconds,
        }
    }
}

/// Persisted state of the session that is currently being timed. Stored separately from records so
/// that a session survives the process being killed.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct TimerState {
    pub tracking: bool,
    /// [Clock::monotonic_ms](crate::utils::clock::Clock::monotonic_ms) captured at start.
    #[serde(default)]
    pub session_start_ms: Option<u64>,
    #[serde(default)]
    pub accumulated_ms: u64,
    /// Day the running session counts towards. Lets a later process notice that the day changed
    /// while it was not running.
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
}

impl TimerState {
    pub fn started_at(session_start_ms: u64) -> Self {
        Self {
            tracking: true,
            session_start_ms: Some(session_start_ms),
            accumulated_ms: 0,
            session_date: None,
        }
    }

    pub fn on(self, date: NaiveDate) -> Self {
        Self {
            session_date: Some(date),
            ..self
        }
    }

    /// Elapsed milliseconds of the session at monotonic time `now_ms`. When the start reference lies
    /// in the future (the monotonic clock restarted after a reboot) only the accumulated part counts.
    pub fn live_elapsed_ms(&self, now_ms: u64) -> u64 {
        match (self.tracking, self.session_start_ms) {
            (true, Some(start)) if start > 0 => {
                now_ms.saturating_sub(start) + self.accumulated_ms
            }
            _ => 0,
        }
    }

    pub fn live_elapsed_seconds(&self, now_ms: u64) -> u64 {
        self.live_elapsed_ms(now_ms) / 1000
    }
}
