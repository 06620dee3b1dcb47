//! Request lifecycle states.

use std::fmt;

/// Where a request is in its lifecycle.
///
/// ```text
/// Initialized → Adapting → Ready → Running ⇄ Suspended
///                  ↑                  │
///                  └──── retry ───────┤
///                                     ↓
///                      Succeeded | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Initialized,
    Adapting,
    Ready,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::Failed | RequestState::Cancelled
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Cancelled => true,
            Adapting => matches!(self, Initialized | Ready | Running | Suspended),
            Ready => self == Adapting,
            Running => matches!(self, Ready | Suspended),
            Suspended => self == Running,
            Succeeded => matches!(self, Running | Suspended),
            Initialized => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Initialized => "initialized",
            RequestState::Adapting => "adapting",
            RequestState::Ready => "ready",
            RequestState::Running => "running",
            RequestState::Suspended => "suspended",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte progress in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    /// Unknown until the peer announces a length.
    pub total: Option<u64>,
}

impl Progress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.completed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    #[test]
    fn test_forward_path() {
        let path = [Initialized, Adapting, Ready, Running, Suspended, Running, Succeeded];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Succeeded, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Initialized, Adapting, Running, Succeeded, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_no_backward_moves() {
        assert!(!Running.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Initialized));
        assert!(!Adapting.can_transition_to(Running));
        assert!(!Initialized.can_transition_to(Succeeded));
        assert!(!Ready.can_transition_to(Suspended));
    }

    #[test]
    fn test_retry_and_cancel_edges() {
        assert!(Running.can_transition_to(Adapting));
        for state in [Initialized, Adapting, Ready, Running, Suspended] {
            assert!(state.can_transition_to(Cancelled));
            assert!(state.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_progress_fraction() {
        let p = Progress { completed: 50, total: Some(200) };
        assert_eq!(p.fraction(), Some(0.25));
        assert_eq!(Progress::default().fraction(), None);
    }
}
