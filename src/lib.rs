//! Personal activity timer. Start a session, assign the time to an activity when you stop it and
//! see how each day measures up against a daily goal, next to the app usage the system reports.
//!
//! The [engine] is usable on its own, [cli] is the terminal front end built on top of it.

pub mod cli;
pub mod engine;
pub mod fs;
pub mod usage;
pub mod utils;
