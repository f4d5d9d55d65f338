//! Device lifecycle states and the legal transitions between them.

use serde::{Deserialize, Serialize};

/// ```text
/// Unenrolled -> Enrolling -> Enrolled -> {Compliant, NonCompliant} -> Removed
///                   ^                                                   |
///                   +---------------------------------------------------+
/// ```
///
/// A failed or cancelled enrollment returns to the state it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unenrolled,
    Enrolling,
    Enrolled,
    Compliant,
    NonCompliant,
    Removed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unenrolled, Enrolling)
                | (Removed, Enrolling)
                | (Enrolling, Enrolled)
                | (Enrolling, Unenrolled)
                | (Enrolling, Removed)
                | (Enrolled | Compliant | NonCompliant, Compliant | NonCompliant)
                | (Enrolled | Compliant | NonCompliant, Removed)
        )
    }

    /// Enrolled, whether or not compliance has been assessed yet.
    pub fn is_enrolled(self) -> bool {
        matches!(
            self,
            LifecycleState::Enrolled | LifecycleState::Compliant | LifecycleState::NonCompliant
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unenrolled => "unenrolled",
            LifecycleState::Enrolling => "enrolling",
            LifecycleState::Enrolled => "enrolled",
            LifecycleState::Compliant => "compliant",
            LifecycleState::NonCompliant => "non_compliant",
            LifecycleState::Removed => "removed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;
    use super::*;

    const ALL: [LifecycleState; 6] = [
        Unenrolled,
        Enrolling,
        Enrolled,
        Compliant,
        NonCompliant,
        Removed,
    ];

    #[test]
    fn happy_path_is_legal() {
        assert!(Unenrolled.can_transition_to(Enrolling));
        assert!(Enrolling.can_transition_to(Enrolled));
        assert!(Enrolled.can_transition_to(Compliant));
        assert!(Compliant.can_transition_to(NonCompliant));
        assert!(NonCompliant.can_transition_to(Removed));
        assert!(Removed.can_transition_to(Enrolling));
    }

    #[test]
    fn shortcuts_are_illegal() {
        assert!(!Unenrolled.can_transition_to(Enrolled));
        assert!(!Unenrolled.can_transition_to(Removed));
        assert!(!Removed.can_transition_to(Enrolled));
        assert!(!Enrolling.can_transition_to(Compliant));
        assert!(!Enrolled.can_transition_to(Unenrolled));
    }

    #[test]
    fn only_enrolled_family_counts_as_enrolled() {
        let enrolled: Vec<_> = ALL.into_iter().filter(|s| s.is_enrolled()).collect();
        assert_eq!(enrolled, vec![Enrolled, Compliant, NonCompliant]);
    }

    #[test]
    fn removed_is_only_left_by_reenrolling() {
        for next in ALL {
            assert_eq!(Removed.can_transition_to(next), next == Enrolling);
        }
    }
}
