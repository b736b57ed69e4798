use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use sysinfo::System;
use tokio::time::Instant;

/// Represents an entity responsible for providing time across application. Session math only ever
/// uses [Clock::monotonic_ms], the wall clock is only used to decide which calendar day it is.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;

    /// Real current calendar day.
    fn today(&self) -> NaiveDate {
        self.time().date_naive()
    }

    /// Milliseconds since boot. Never goes backwards while the machine is running and ignores
    /// timezone or clock changes. Values are comparable between processes of the same boot.
    fn monotonic_ms(&self) -> u64;

    async fn sleep(&self, duration: Duration);
}

/// Reads milliseconds since boot straight from the kernel, so that references persisted by one
/// process can be compared with the clock of another one. Where there is no such clock a process
/// local [Instant] anchored to the system uptime is used instead.
pub struct DefaultClock {
    boot_offset: Duration,
    anchor: Instant,
}

impl DefaultClock {
    pub fn new() -> Self {
        Self {
            boot_offset: Duration::from_secs(System::uptime()),
            anchor: Instant::now(),
        }
    }

    fn anchored_ms(&self) -> u64 {
        (self.boot_offset + self.anchor.elapsed()).as_millis() as u64
    }
}

impl Default for DefaultClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn kernel_clock_ms(clock: nix::time::ClockId) -> Option<u64> {
    let time = nix::time::clock_gettime(clock).ok()?;
    let millis = time.tv_sec() as i64 * 1000 + time.tv_nsec() as i64 / 1_000_000;
    u64::try_from(millis).ok()
}

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn monotonic_ms(&self) -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                // Keeps counting while the machine is suspended
                kernel_clock_ms(nix::time::ClockId::CLOCK_BOOTTIME)
                    .unwrap_or_else(|| self.anchored_ms())
            } else if #[cfg(unix)] {
                kernel_clock_ms(nix::time::ClockId::CLOCK_MONOTONIC)
                    .unwrap_or_else(|| self.anchored_ms())
            } else {
                self.anchored_ms()
            }
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
