// crates/meridian-gossip/src/state.rs
//
// Service lifecycle state machine.
//
// Valid transitions:
//   Running -> Stopping -> Stopped
//   Any state except Halted -> Halted

use std::fmt;

use meridian_core::MeridianError;

/// Lifecycle states of the node service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Accepting and admitting events.
    Running,
    /// Intake closed, draining in-flight work.
    Stopping,
    /// Engine marked stopped and the store committed.
    Stopped,
    /// A fatal fault occurred; nothing is admitted any more.
    Halted,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => write!(f, "Running"),
            ServiceState::Stopping => write!(f, "Stopping"),
            ServiceState::Stopped => write!(f, "Stopped"),
            ServiceState::Halted => write!(f, "Halted"),
        }
    }
}

/// State machine for the service lifecycle.
#[derive(Debug)]
pub struct ServiceStateMachine {
    pub current: ServiceState,
}

impl ServiceStateMachine {
    pub fn new() -> Self {
        Self {
            current: ServiceState::Running,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition(&mut self, new_state: ServiceState) -> Result<(), MeridianError> {
        let valid = match (self.current, new_state) {
            (ServiceState::Halted, _) => false,
            (_, ServiceState::Halted) => true,
            (ServiceState::Running, ServiceState::Stopping) => true,
            (ServiceState::Stopping, ServiceState::Stopped) => true,
            _ => false,
        };

        if valid {
            tracing::info!("State transition: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(MeridianError::InvalidState(format!(
                "Invalid state transition: {} -> {}",
                self.current, new_state
            )))
        }
    }
}

impl Default for ServiceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_path() {
        let mut sm = ServiceStateMachine::new();
        sm.transition(ServiceState::Stopping).unwrap();
        sm.transition(ServiceState::Stopped).unwrap();
        assert_eq!(sm.current, ServiceState::Stopped);
    }

    #[test]
    fn test_halted_is_terminal() {
        let mut sm = ServiceStateMachine::new();
        assert!(sm.transition(ServiceState::Stopped).is_err());
        sm.transition(ServiceState::Halted).unwrap();
        assert!(sm.transition(ServiceState::Stopping).is_err());
        assert!(sm.transition(ServiceState::Halted).is_err());
        assert_eq!(sm.current, ServiceState::Halted);
    }
}
