use std::fmt;

/// Position in the unlock cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    Locked,
    PoweringOn,
    Unlocking,
    HoldingOpen,
    Relocking,
    PoweringOff,
    /// Hardware error during a cycle; outputs have been safed
    Faulted,
}

impl LockState {
    /// States in which motor power is asserted
    pub fn is_energized(&self) -> bool {
        matches!(
            self,
            LockState::PoweringOn
                | LockState::Unlocking
                | LockState::HoldingOpen
                | LockState::Relocking
                | LockState::PoweringOff
        )
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Locked => "locked",
            LockState::PoweringOn => "powering_on",
            LockState::Unlocking => "unlocking",
            LockState::HoldingOpen => "holding_open",
            LockState::Relocking => "relocking",
            LockState::PoweringOff => "powering_off",
            LockState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energized_states() {
        assert!(!LockState::Locked.is_energized());
        assert!(!LockState::Faulted.is_energized());
        assert!(LockState::PoweringOn.is_energized());
        assert!(LockState::HoldingOpen.is_energized());
        assert!(LockState::PoweringOff.is_energized());
        assert_eq!(LockState::HoldingOpen.to_string(), "holding_open");
    }
}
