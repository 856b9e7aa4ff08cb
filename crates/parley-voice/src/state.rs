//! Voice capture state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for the capture lifecycle:
//! - Idle -> RequestingPermission (start requested)
//! - RequestingPermission -> Recording (device acquired)
//! - RequestingPermission -> Idle (permission denied)
//! - Recording -> StoppedAwaitingConfirm (capture stopped, device released)
//! - Recording -> Idle (cancel, audio discarded)
//! - StoppedAwaitingConfirm -> Transcribing (user confirmed)
//! - StoppedAwaitingConfirm -> Idle (user discarded the take)
//! - Transcribing -> Idle (transcription finished or failed)

use std::fmt;
use std::sync::{Arc, Mutex};

use parley_core::error::ParleyError;

/// Operational state of the voice capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    /// No capture in progress. Ready to start.
    Idle,
    /// Waiting for the microphone device to be granted.
    RequestingPermission,
    /// Actively buffering audio from the microphone.
    Recording,
    /// Capture stopped; audio held until the user confirms or discards.
    StoppedAwaitingConfirm,
    /// Encoded audio submitted to the transcription service.
    Transcribing,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceState::Idle => write!(f, "Idle"),
            VoiceState::RequestingPermission => write!(f, "RequestingPermission"),
            VoiceState::Recording => write!(f, "Recording"),
            VoiceState::StoppedAwaitingConfirm => write!(f, "StoppedAwaitingConfirm"),
            VoiceState::Transcribing => write!(f, "Transcribing"),
        }
    }
}

impl VoiceState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &VoiceState) -> bool {
        matches!(
            (self, target),
            (VoiceState::Idle, VoiceState::RequestingPermission)
                | (VoiceState::RequestingPermission, VoiceState::Recording)
                | (VoiceState::Recording, VoiceState::StoppedAwaitingConfirm)
                | (VoiceState::StoppedAwaitingConfirm, VoiceState::Transcribing)
                | (VoiceState::Transcribing, VoiceState::Idle)
                // Bail-out transitions
                | (VoiceState::RequestingPermission, VoiceState::Idle)
                | (VoiceState::Recording, VoiceState::Idle)
                | (VoiceState::StoppedAwaitingConfirm, VoiceState::Idle)
        )
    }
}

/// Thread-safe state machine for voice capture transitions.
///
/// All transitions are validated before being applied, returning an error
/// if the requested transition is not permitted.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<VoiceState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VoiceState::Idle)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> VoiceState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: VoiceState) -> Result<(), ParleyError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Voice state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(ParleyError::Audio(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state machine back to Idle (used for error recovery).
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        tracing::warn!("Voice state machine reset to Idle from {}", *state);
        *state = VoiceState::Idle;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(VoiceState::Idle.to_string(), "Idle");
        assert_eq!(
            VoiceState::RequestingPermission.to_string(),
            "RequestingPermission"
        );
        assert_eq!(VoiceState::Recording.to_string(), "Recording");
        assert_eq!(
            VoiceState::StoppedAwaitingConfirm.to_string(),
            "StoppedAwaitingConfirm"
        );
        assert_eq!(VoiceState::Transcribing.to_string(), "Transcribing");
    }

    #[test]
    fn test_valid_transitions() {
        // Forward path
        assert!(VoiceState::Idle.can_transition_to(&VoiceState::RequestingPermission));
        assert!(VoiceState::RequestingPermission.can_transition_to(&VoiceState::Recording));
        assert!(VoiceState::Recording.can_transition_to(&VoiceState::StoppedAwaitingConfirm));
        assert!(VoiceState::StoppedAwaitingConfirm.can_transition_to(&VoiceState::Transcribing));
        assert!(VoiceState::Transcribing.can_transition_to(&VoiceState::Idle));

        // Bail-out transitions
        assert!(VoiceState::RequestingPermission.can_transition_to(&VoiceState::Idle));
        assert!(VoiceState::Recording.can_transition_to(&VoiceState::Idle));
        assert!(VoiceState::StoppedAwaitingConfirm.can_transition_to(&VoiceState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot skip states
        assert!(!VoiceState::Idle.can_transition_to(&VoiceState::Recording));
        assert!(!VoiceState::Idle.can_transition_to(&VoiceState::Transcribing));
        assert!(!VoiceState::RequestingPermission.can_transition_to(&VoiceState::Transcribing));

        // Cannot go backwards
        assert!(!VoiceState::Recording.can_transition_to(&VoiceState::RequestingPermission));
        assert!(!VoiceState::Transcribing.can_transition_to(&VoiceState::Recording));

        // Cannot abandon an in-flight transcription
        assert!(!VoiceState::Transcribing.can_transition_to(&VoiceState::Transcribing));

        // Cannot transition to self
        assert!(!VoiceState::Idle.can_transition_to(&VoiceState::Idle));
        assert!(!VoiceState::Recording.can_transition_to(&VoiceState::Recording));
    }

    #[test]
    fn test_state_machine_happy_path() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), VoiceState::Idle);

        sm.transition(VoiceState::RequestingPermission).unwrap();
        sm.transition(VoiceState::Recording).unwrap();
        sm.transition(VoiceState::StoppedAwaitingConfirm).unwrap();
        sm.transition(VoiceState::Transcribing).unwrap();
        sm.transition(VoiceState::Idle).unwrap();
        assert_eq!(sm.current(), VoiceState::Idle);
    }

    #[test]
    fn test_state_machine_permission_denied_path() {
        let sm = StateMachine::new();
        sm.transition(VoiceState::RequestingPermission).unwrap();
        sm.transition(VoiceState::Idle).unwrap();
        assert_eq!(sm.current(), VoiceState::Idle);
    }

    #[test]
    fn test_state_machine_cancel_recording() {
        let sm = StateMachine::new();
        sm.transition(VoiceState::RequestingPermission).unwrap();
        sm.transition(VoiceState::Recording).unwrap();
        sm.transition(VoiceState::Idle).unwrap();
        assert_eq!(sm.current(), VoiceState::Idle);
    }

    #[test]
    fn test_state_machine_invalid_transition() {
        let sm = StateMachine::new();
        let result = sm.transition(VoiceState::Recording);
        assert!(result.is_err());
        assert_eq!(sm.current(), VoiceState::Idle);
    }

    #[test]
    fn test_state_machine_reset() {
        let sm = StateMachine::new();
        sm.transition(VoiceState::RequestingPermission).unwrap();
        sm.transition(VoiceState::Recording).unwrap();
        sm.reset();
        assert_eq!(sm.current(), VoiceState::Idle);
    }

    #[test]
    fn test_state_machine_clone_is_shared() {
        let sm1 = StateMachine::new();
        let sm2 = sm1.clone();

        sm1.transition(VoiceState::RequestingPermission).unwrap();
        assert_eq!(sm2.current(), VoiceState::RequestingPermission);
    }
}
