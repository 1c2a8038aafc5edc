//! ---
//! gdm_section: "04-control-loop"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Polling control loop and state machine."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---

/// Operating state of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Operator switch off: derating bypassed, output pinned to the ceiling.
    Disabled,
    /// Operator switch on: output follows the calculator.
    Active,
}

impl LoopState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            LoopState::Active
        } else {
            LoopState::Disabled
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LoopState::Active)
    }
}

/// Logical debounce for the operator switch.
///
/// The digital input line can chatter; a state change is only confirmed
/// after the same reading arrives on `required` consecutive polls. Any
/// reading that matches the confirmed state resets the streak.
#[derive(Debug)]
pub struct SwitchDebouncer {
    confirmed: LoopState,
    candidate: Option<LoopState>,
    streak: u32,
    required: u32,
}

impl SwitchDebouncer {
    pub fn new(initial: LoopState, required: u32) -> Self {
        Self {
            confirmed: initial,
            candidate: None,
            streak: 0,
            required: required.max(1),
        }
    }

    pub fn confirmed(&self) -> LoopState {
        self.confirmed
    }

    /// Discard any pending candidate and adopt `state` immediately.
    pub fn reset_to(&mut self, state: LoopState) {
        self.confirmed = state;
        self.candidate = None;
        self.streak = 0;
    }

    /// Feed one poll of the switch. Returns the new state when a
    /// transition is confirmed, `None` otherwise.
    pub fn observe(&mut self, enabled: bool) -> Option<LoopState> {
        let observed = LoopState::from_enabled(enabled);
        if observed == self.confirmed {
            self.candidate = None;
            self.streak = 0;
            return None;
        }

        if self.candidate == Some(observed) {
            self.streak += 1;
        } else {
            self.candidate = Some(observed);
            self.streak = 1;
        }

        if self.streak >= self.required {
            self.confirmed = observed;
            self.candidate = None;
            self.streak = 0;
            Some(observed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_required_reading_switches_immediately() {
        let mut debouncer = SwitchDebouncer::new(LoopState::Disabled, 1);
        assert_eq!(debouncer.observe(true), Some(LoopState::Active));
        assert_eq!(debouncer.confirmed(), LoopState::Active);
    }

    #[test]
    fn transition_requires_consecutive_readings() {
        let mut debouncer = SwitchDebouncer::new(LoopState::Disabled, 2);
        assert_eq!(debouncer.observe(true), None);
        assert_eq!(debouncer.confirmed(), LoopState::Disabled);
        assert_eq!(debouncer.observe(true), Some(LoopState::Active));
        assert_eq!(debouncer.confirmed(), LoopState::Active);
    }

    #[test]
    fn glitch_resets_the_streak() {
        let mut debouncer = SwitchDebouncer::new(LoopState::Active, 2);
        assert_eq!(debouncer.observe(false), None);
        // Line recovers; the half-counted transition is discarded.
        assert_eq!(debouncer.observe(true), None);
        assert_eq!(debouncer.confirmed(), LoopState::Active);
        // A fresh off-streak still needs the full count.
        assert_eq!(debouncer.observe(false), None);
        assert_eq!(debouncer.observe(false), Some(LoopState::Disabled));
    }

    #[test]
    fn zero_required_is_clamped_to_one() {
        let mut debouncer = SwitchDebouncer::new(LoopState::Disabled, 0);
        assert_eq!(debouncer.observe(true), Some(LoopState::Active));
    }

    #[test]
    fn reset_discards_pending_candidate() {
        let mut debouncer = SwitchDebouncer::new(LoopState::Disabled, 2);
        assert_eq!(debouncer.observe(true), None);
        debouncer.reset_to(LoopState::Disabled);
        assert_eq!(debouncer.observe(true), None);
        assert_eq!(debouncer.observe(true), Some(LoopState::Active));
    }
}
