//! Poll loop driver.
//!
//! Fixed-interval loop: evaluate the working-hours predicate, query the
//! status source when the alert is live, feed the result to the state
//! machine, and apply the emitted relay command. Device I/O failures are
//! logged and the loop continues; nothing is retried within an
//! iteration.

use crate::alert::{AlertLight, RelayCommand};
use crate::config::Settings;
use crate::status::StatusClient;
use lib_relay_ffi::RelaySwitch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Run the poll loop until the shutdown flag is raised.
///
/// The flag is only observed between iterations, never mid vendor call.
pub fn run<S: RelaySwitch>(
    device: &mut S,
    client: &StatusClient,
    settings: &Settings,
    shutdown: &AtomicBool,
) {
    let mut light = AlertLight::new();

    while !shutdown.load(Ordering::SeqCst) {
        let now = chrono::Local::now().naive_local();
        let in_working_hours = settings.working_hours.contains(now);

        let failure_count = if in_working_hours {
            tracing::info!("Working hours, warning light suppressed");
            None
        } else {
            match client.failed_job_count() {
                Ok(0) => {
                    tracing::info!("Everything is OK");
                    Some(0)
                }
                Ok(count) => {
                    tracing::info!(count, "There are failing jobs");
                    Some(count)
                }
                Err(e) => {
                    tracing::warn!(error = format!("{e:#}"), "Failed to get build status");
                    None
                }
            }
        };

        step(&mut light, device, in_working_hours, failure_count);

        sleep_until_shutdown(settings.poll_interval, shutdown);
    }

    tracing::info!("Shutdown requested, leaving poll loop");
}

/// One poll iteration: advance the state machine and apply its command
/// to the device, best-effort.
pub fn step<S: RelaySwitch>(
    light: &mut AlertLight,
    device: &mut S,
    in_working_hours: bool,
    failure_count: Option<u32>,
) {
    let Some(command) = light.evaluate(in_working_hours, failure_count) else {
        return;
    };

    let result = match command {
        RelayCommand::SetChannel { channel, on } => device.set_channel(channel, on),
        RelayCommand::CloseAll => device.close_all(),
    };

    // The vendor API offers nothing richer to recover with, so a failed
    // command is logged and the next iteration re-evaluates.
    if let Err(e) = result {
        tracing::warn!(error = %e, ?command, "Relay command failed");
    }
}

/// Ordered device teardown: close every channel, then release the
/// handle. Each step is attempted even if the previous one failed.
/// Library exit follows in the caller, after the handle is gone.
pub fn teardown<S: RelaySwitch>(device: &mut S) {
    if let Err(e) = device.close_all() {
        tracing::warn!(error = %e, "Failed to close relay channels during teardown");
    }
    if let Err(e) = device.release() {
        tracing::warn!(error = %e, "Failed to release relay device during teardown");
    }
}

/// Sleep for the poll interval, waking early when shutdown is raised.
fn sleep_until_shutdown(interval: Duration, shutdown: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(250);
    let deadline = Instant::now() + interval;
    while Instant::now() < deadline && !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(SLICE.min(deadline.saturating_duration_since(Instant::now())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hours::WorkingHours;
    use chrono::{NaiveDate, NaiveDateTime};
    use lib_relay_ffi::{RelayError, RelayResult};

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        Set { channel: u8, on: bool },
        CloseAll,
        Release,
    }

    /// Records every call; optionally fails close_all to exercise the
    /// teardown ordering.
    struct RecordingRelay {
        calls: Vec<Call>,
        fail_close_all: bool,
    }

    impl RecordingRelay {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fail_close_all: false,
            }
        }
    }

    impl RelaySwitch for RecordingRelay {
        fn set_channel(&mut self, channel: u8, on: bool) -> RelayResult<()> {
            self.calls.push(Call::Set { channel, on });
            Ok(())
        }

        fn close_all(&mut self) -> RelayResult<()> {
            self.calls.push(Call::CloseAll);
            if self.fail_close_all {
                return Err(RelayError::CloseAllFailed { code: 2 });
            }
            Ok(())
        }

        fn release(&mut self) -> RelayResult<()> {
            self.calls.push(Call::Release);
            Ok(())
        }
    }

    fn tuesday(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn test_red_job_during_working_hours_keeps_light_dark() {
        let hours = WorkingHours::weekdays_default();
        assert!(hours.contains(tuesday(10, 0)));

        let mut light = AlertLight::new();
        let mut relay = RecordingRelay::new();
        // One failing job reported, but it is 10:00 on a Tuesday.
        step(&mut light, &mut relay, true, Some(1));
        assert!(relay.calls.is_empty());
    }

    #[test]
    fn test_red_job_in_evening_turns_light_on_once() {
        let hours = WorkingHours::weekdays_default();
        assert!(!hours.contains(tuesday(20, 0)));

        let mut light = AlertLight::new();
        let mut relay = RecordingRelay::new();
        step(&mut light, &mut relay, false, Some(1));
        assert_eq!(relay.calls, vec![Call::Set { channel: 1, on: true }]);
    }

    #[test]
    fn test_failed_query_issues_no_commands() {
        let mut light = AlertLight::new();
        let mut relay = RecordingRelay::new();
        step(&mut light, &mut relay, false, None);
        assert!(relay.calls.is_empty());
    }

    #[test]
    fn test_entering_working_hours_closes_all() {
        let mut light = AlertLight::new();
        let mut relay = RecordingRelay::new();
        step(&mut light, &mut relay, false, Some(2));
        step(&mut light, &mut relay, true, None);
        assert_eq!(
            relay.calls,
            vec![Call::Set { channel: 1, on: true }, Call::CloseAll]
        );
    }

    #[test]
    fn test_teardown_order() {
        let mut relay = RecordingRelay::new();
        teardown(&mut relay);
        assert_eq!(relay.calls, vec![Call::CloseAll, Call::Release]);
    }

    #[test]
    fn test_teardown_releases_even_when_close_all_fails() {
        let mut relay = RecordingRelay::new();
        relay.fail_close_all = true;
        teardown(&mut relay);
        assert_eq!(relay.calls, vec![Call::CloseAll, Call::Release]);
    }

    #[test]
    fn test_full_failure_and_recovery_sequence() {
        let mut light = AlertLight::new();
        let mut relay = RecordingRelay::new();

        step(&mut light, &mut relay, false, Some(0)); // quiet night
        step(&mut light, &mut relay, false, Some(1)); // build breaks
        step(&mut light, &mut relay, false, Some(1)); // still broken, re-assert
        step(&mut light, &mut relay, false, None); // jenkins hiccup
        step(&mut light, &mut relay, false, Some(0)); // fixed
        teardown(&mut relay);

        assert_eq!(
            relay.calls,
            vec![
                Call::Set { channel: 1, on: true },
                Call::Set { channel: 1, on: true },
                Call::Set { channel: 1, on: false },
                Call::CloseAll,
                Call::Release,
            ]
        );
    }
}
