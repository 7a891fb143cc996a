//! Tracks which phase a survey session is in.

use serde::{Deserialize, Serialize};

/// The phases of one survey conversation.
///
/// Asking → AwaitingConfirmation → Done, with a way back to Asking when the
/// user rejects the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyPhase {
    #[default]
    Asking,
    AwaitingConfirmation,
    Done,
}

impl SurveyPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SurveyPhase) -> bool {
        use SurveyPhase::*;
        matches!(
            (self, target),
            (Asking, AwaitingConfirmation)
                | (AwaitingConfirmation, Asking)
                | (AwaitingConfirmation, Done)
                // Forms without a confirmation field finish straight from Asking.
                | (Asking, Done)
        )
    }

    /// Whether the survey is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for SurveyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Asking => "asking",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}
