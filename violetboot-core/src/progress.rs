//! Messages a session emits while it runs.
use std::fmt;

/// Where a [`Session`](crate::session::Session) is in its lifecycle.
///
/// `Idle → Releasing → Writing → (Verifying) → Success | Failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Releasing,
    Writing,
    Verifying,
    Success,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Success | Phase::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Idle, Releasing) => true,
            (Releasing, Writing) => true,
            (Writing, Verifying | Success) => true,
            (Verifying, Success) => true,
            (Releasing | Writing | Verifying, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Phase::Idle => "Ready",
            Phase::Releasing => "Unmounting device...",
            Phase::Writing => "Writing image...",
            Phase::Verifying => "Verifying integrity...",
            Phase::Success => "Success",
            Phase::Failed => "Failed",
        };
        f.write_str(text)
    }
}

/// Bytes processed so far within one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub bytes_done: u64,
    pub total_bytes: u64,
}

impl ProgressEvent {
    /// Completed share of the phase in `[0, 1]`. An empty image is complete.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }
}

/// One entry in the ordered event stream of a session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlashEvent {
    Status(Phase),
    Progress(ProgressEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_state_machine() {
        assert!(Phase::Idle.can_advance_to(Phase::Releasing));
        assert!(Phase::Writing.can_advance_to(Phase::Success));
        assert!(Phase::Verifying.can_advance_to(Phase::Failed));

        assert!(!Phase::Idle.can_advance_to(Phase::Writing));
        assert!(!Phase::Success.can_advance_to(Phase::Failed));
        assert!(!Phase::Failed.can_advance_to(Phase::Releasing));
        assert!(!Phase::Verifying.can_advance_to(Phase::Writing));
    }

    #[test]
    fn fraction_is_bounded() {
        let half = ProgressEvent {
            phase: Phase::Writing,
            bytes_done: 8,
            total_bytes: 16,
        };
        assert_eq!(half.fraction(), 0.5);

        let empty = ProgressEvent {
            phase: Phase::Writing,
            bytes_done: 0,
            total_bytes: 0,
        };
        assert_eq!(empty.fraction(), 1.0);
    }
}
