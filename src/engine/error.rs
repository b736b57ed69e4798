use thiserror::Error;

/// Requests the engine refuses. Carried inside [anyhow::Error], use `downcast_ref` to tell them
/// apart from I/O failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("Time can't be assigned to the empty activity")]
    EmptyCategory,

    #[error("Invalid month {month} of year {year}")]
    InvalidMonth { year: i32, month: u32 },
}
