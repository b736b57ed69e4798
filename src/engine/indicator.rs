use std::{io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Always visible sign that a session is being timed. The platform is allowed to refuse it, in which
/// case the session must not keep running unnoticed.
#[cfg_attr(test, mockall::automock)]
pub trait ActivityIndicator: Send {
    /// `since` is the wall clock moment the session would have started if it had never been
    /// interrupted, so that a chronometer can count up from it.
    fn start(&mut self, since: DateTime<Local>) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OngoingMarker {
    pub since: DateTime<Local>,
}

/// Shows the ongoing session as a small file that shell prompts and status bars can pick up.
pub struct MarkerFileIndicator {
    path: PathBuf,
}

impl MarkerFileIndicator {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn read(&self) -> Result<Option<OngoingMarker>> {
        match std::fs::read(&self.path) {
            Ok(v) => Ok(Some(serde_json::from_slice(&v)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ActivityIndicator for MarkerFileIndicator {
    fn start(&mut self, since: DateTime<Local>) -> Result<()> {
        let marker = serde_json::to_vec(&OngoingMarker { since })?;
        std::fs::write(&self.path, marker)
            .with_context(|| format!("Can't show ongoing activity in {:?}", self.path))?;
        debug!("Ongoing marker written to {:?}", self.path);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_marker_lifecycle() -> Result<()> {
        let dir = tempdir()?;
        let mut indicator = MarkerFileIndicator::new(dir.path().join("ongoing.json"));
        let since = Local.timestamp_opt(1_700_000_000, 0).unwrap();

        indicator.start(since)?;
        assert_eq!(indicator.read()?, Some(OngoingMarker { since }));

        indicator.stop()?;
        assert_eq!(indicator.read()?, None);
        // Stopping twice is fine
        indicator.stop()?;
        Ok(())
    }

    #[test]
    fn test_unwritable_marker_is_refused() -> Result<()> {
        let dir = tempdir()?;
        let mut indicator = MarkerFileIndicator::new(dir.path().join("missing/ongoing.json"));
        assert!(indicator.start(Local::now()).is_err());
        Ok(())
    }
}
