//!  Durable state of the engine lives in two places:
//!   - [record_storage::RecordStorageImpl] keeps finished records, one JSON lines file per day.
//!   - [timer_state::FileTimerStateStorage] keeps the session that is being timed right now, so it
//!     survives the process being killed.

pub mod entities;
pub mod record_storage;
pub mod timer_state;
