//! Alert state machine for the warning light.
//!
//! Holds the logical indicator state and turns each poll result into at
//! most one relay command. The machine never touches the device itself;
//! the poll driver applies the emitted command.

/// Relay channel the warning light is wired to.
pub const ALERT_CHANNEL: u8 = 1;

/// Logical indicator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorState {
    Off,
    On,
}

/// A command for the relay device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayCommand {
    SetChannel { channel: u8, on: bool },
    CloseAll,
}

/// The warning-light state machine.
pub struct AlertLight {
    state: IndicatorState,
}

impl AlertLight {
    pub fn new() -> Self {
        Self {
            state: IndicatorState::Off,
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Advance the machine one poll step and return the relay command to
    /// issue, if any.
    ///
    /// `failure_count` is `None` when the status query failed; the step is
    /// then a no-op (state unchanged, no command).
    ///
    /// During working hours the light is forced off regardless of the
    /// failure count; `CloseAll` is emitted only when the light was on, so
    /// no stale alert persists and the off-to-off step stays silent.
    ///
    /// Out of hours while failing, `SetChannel(on)` is re-emitted every
    /// step even when already on. The vendor API has no channel-state
    /// query cheaper than re-issuing the command, so the machine favors a
    /// redundant idempotent call over extra bookkeeping.
    pub fn evaluate(
        &mut self,
        in_working_hours: bool,
        failure_count: Option<u32>,
    ) -> Option<RelayCommand> {
        if in_working_hours {
            let was_on = self.state == IndicatorState::On;
            self.state = IndicatorState::Off;
            return was_on.then_some(RelayCommand::CloseAll);
        }

        let failures = failure_count?;

        if failures > 0 {
            self.state = IndicatorState::On;
            return Some(RelayCommand::SetChannel {
                channel: ALERT_CHANNEL,
                on: true,
            });
        }

        let was_on = self.state == IndicatorState::On;
        self.state = IndicatorState::Off;
        was_on.then_some(RelayCommand::SetChannel {
            channel: ALERT_CHANNEL,
            on: false,
        })
    }
}

impl Default for AlertLight {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET_ON: RelayCommand = RelayCommand::SetChannel {
        channel: ALERT_CHANNEL,
        on: true,
    };
    const SET_OFF: RelayCommand = RelayCommand::SetChannel {
        channel: ALERT_CHANNEL,
        on: false,
    };

    #[test]
    fn test_failures_out_of_hours_turn_on_from_any_state() {
        for initial_on in [false, true] {
            let mut light = AlertLight::new();
            if initial_on {
                light.evaluate(false, Some(3));
            }
            let cmd = light.evaluate(false, Some(1));
            assert_eq!(light.state(), IndicatorState::On);
            assert_eq!(cmd, Some(SET_ON));
        }
    }

    #[test]
    fn test_working_hours_force_off() {
        // Was on: close_all must be emitted.
        let mut light = AlertLight::new();
        light.evaluate(false, Some(2));
        assert_eq!(light.state(), IndicatorState::On);
        let cmd = light.evaluate(true, Some(2));
        assert_eq!(light.state(), IndicatorState::Off);
        assert_eq!(cmd, Some(RelayCommand::CloseAll));

        // Already off: nothing to do, even with failures reported.
        let cmd = light.evaluate(true, Some(5));
        assert_eq!(light.state(), IndicatorState::Off);
        assert_eq!(cmd, None);
    }

    #[test]
    fn test_off_to_off_is_silent() {
        let mut light = AlertLight::new();
        assert_eq!(light.evaluate(false, Some(0)), None);
        assert_eq!(light.evaluate(false, Some(0)), None);
        assert_eq!(light.state(), IndicatorState::Off);
    }

    #[test]
    fn test_recovery_turns_light_off_once() {
        let mut light = AlertLight::new();
        light.evaluate(false, Some(1));
        let cmd = light.evaluate(false, Some(0));
        assert_eq!(light.state(), IndicatorState::Off);
        assert_eq!(cmd, Some(SET_OFF));
        assert_eq!(light.evaluate(false, Some(0)), None);
    }

    #[test]
    fn test_on_reasserts_while_failing() {
        let mut light = AlertLight::new();
        assert_eq!(light.evaluate(false, Some(1)), Some(SET_ON));
        assert_eq!(light.evaluate(false, Some(4)), Some(SET_ON));
        assert_eq!(light.state(), IndicatorState::On);
    }

    #[test]
    fn test_failed_query_is_a_no_op() {
        let mut light = AlertLight::new();
        assert_eq!(light.evaluate(false, None), None);
        assert_eq!(light.state(), IndicatorState::Off);

        light.evaluate(false, Some(1));
        assert_eq!(light.evaluate(false, None), None);
        assert_eq!(light.state(), IndicatorState::On);
    }
}
