use super::types::State;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: State, to: State },
}

/// Targets reachable from `src`.
fn allowed_targets(src: State) -> &'static [State] {
    match src {
        State::Pending => &[State::Scheduled],
        State::Scheduled => &[State::Running, State::Failed],
        State::Running => &[State::Completed, State::Failed],
        // Only a restart leaves Failed.
        State::Failed => &[State::Scheduled],
        State::Completed => &[],
    }
}

pub fn valid_state_transition(src: &State, dst: &State) -> bool {
    allowed_targets(*src).contains(dst)
}

pub fn check_transition(src: State, dst: State) -> Result<(), TaskError> {
    if valid_state_transition(&src, &dst) {
        Ok(())
    } else {
        Err(TaskError::InvalidTransition { from: src, to: dst })
    }
}
