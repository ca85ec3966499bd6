use crate::error::{CallKind, RteError};

/// Lifecycle state of one RTE session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotInitialized,
    Initialized,
    /// Terminal: no further transitions are accepted.
    Terminated,
}

/// Enforces the legal order of RTE calls.
///
/// `NotInitialized -> Initialized -> Terminated`. Rejected calls leave the
/// state untouched.
#[derive(Debug, Clone, Default)]
pub struct CallSequencer {
    state: SessionState,
}

impl CallSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// # Errors
    ///
    /// `AlreadyInitialized` while a session is live, `InstanceTerminated`
    /// once it has been closed.
    pub fn initialize(&mut self) -> Result<(), RteError> {
        match self.state {
            SessionState::NotInitialized => {
                self.state = SessionState::Initialized;
                Ok(())
            }
            SessionState::Initialized => Err(RteError::AlreadyInitialized),
            SessionState::Terminated => Err(RteError::InstanceTerminated),
        }
    }

    /// Check that `call` is legal right now without changing state.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or `AfterTermination` for the given call.
    pub fn ensure_live(&self, call: CallKind) -> Result<(), RteError> {
        match self.state {
            SessionState::Initialized => Ok(()),
            SessionState::NotInitialized => Err(RteError::NotInitialized { call }),
            SessionState::Terminated => Err(RteError::AfterTermination { call }),
        }
    }

    /// # Errors
    ///
    /// Same as [`CallSequencer::ensure_live`] for `Terminate`.
    pub fn terminate(&mut self) -> Result<(), RteError> {
        self.ensure_live(CallKind::Terminate)?;
        self.state = SessionState::Terminated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut seq = CallSequencer::new();
        assert_eq!(seq.state(), SessionState::NotInitialized);
        seq.initialize().unwrap();
        assert!(seq.is_initialized());
        seq.ensure_live(CallKind::Commit).unwrap();
        seq.terminate().unwrap();
        assert_eq!(seq.state(), SessionState::Terminated);
    }

    #[test]
    fn second_initialize_fails_without_state_change() {
        let mut seq = CallSequencer::new();
        seq.initialize().unwrap();
        assert_eq!(seq.initialize(), Err(RteError::AlreadyInitialized));
        assert!(seq.is_initialized());
    }

    #[test]
    fn terminated_is_final() {
        let mut seq = CallSequencer::new();
        seq.initialize().unwrap();
        seq.terminate().unwrap();

        assert_eq!(seq.initialize(), Err(RteError::InstanceTerminated));
        assert_eq!(
            seq.terminate(),
            Err(RteError::AfterTermination {
                call: CallKind::Terminate
            })
        );
        assert_eq!(
            seq.ensure_live(CallKind::GetValue),
            Err(RteError::AfterTermination {
                call: CallKind::GetValue
            })
        );
    }

    #[test]
    fn calls_before_initialize_are_rejected() {
        let mut seq = CallSequencer::new();
        assert_eq!(
            seq.ensure_live(CallKind::SetValue),
            Err(RteError::NotInitialized {
                call: CallKind::SetValue
            })
        );
        assert_eq!(
            seq.terminate(),
            Err(RteError::NotInitialized {
                call: CallKind::Terminate
            })
        );
        assert_eq!(seq.state(), SessionState::NotInitialized);
    }
}
