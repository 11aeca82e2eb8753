//! Render admission state
//!
//! Tracks the one render operation allowed per viewer. A request arriving
//! while a render is active cancels it and is remembered; when the active
//! render settles the remembered request is started in its place.

use super::request::RenderTarget;
use super::types::CancelToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Rendering,
    Cancelling,
}

/// Current admission state
#[derive(Debug)]
pub struct RenderState {
    phase: RenderPhase,
    active: Option<CancelToken>,
    pending: Option<RenderTarget>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RenderPhase::Idle,
            active: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    #[must_use]
    pub fn pending(&self) -> Option<&RenderTarget> {
        self.pending.as_ref()
    }

    /// Apply a command and return the resulting effect
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Effect {
        match cmd {
            Command::Request(target) => match self.phase {
                RenderPhase::Idle => self.start(target),
                RenderPhase::Rendering => {
                    if let Some(token) = &self.active {
                        token.cancel();
                    }
                    self.pending = Some(target);
                    self.phase = RenderPhase::Cancelling;
                    Effect::Cancelled
                }
                RenderPhase::Cancelling => {
                    self.pending = Some(target);
                    Effect::Superseded
                }
            },

            Command::Settle => match self.pending.take() {
                Some(target) => self.start(target),
                None => {
                    self.phase = RenderPhase::Idle;
                    self.active = None;
                    Effect::None
                }
            },

            Command::Abort => {
                if let Some(token) = self.active.take() {
                    token.cancel();
                }
                self.pending = None;
                if self.phase != RenderPhase::Idle {
                    self.phase = RenderPhase::Cancelling;
                }
                Effect::None
            }
        }
    }

    fn start(&mut self, target: RenderTarget) -> Effect {
        let token = CancelToken::new();
        self.active = Some(token.clone());
        self.phase = RenderPhase::Rendering;
        Effect::Start { target, token }
    }
}

/// Inputs to the admission state
#[derive(Clone, Debug)]
pub enum Command {
    /// A render was asked for
    Request(RenderTarget),
    /// The active render finished, failed or observed its cancellation
    Settle,
    /// Cancel the active render and forget any pending request
    Abort,
}

/// What the caller must do next
#[derive(Clone, Debug)]
pub enum Effect {
    /// Run a render for `target`, observing `token`
    Start {
        target: RenderTarget,
        token: CancelToken,
    },
    /// The active render was signalled; the request will run once it settles
    Cancelled,
    /// A cancellation was already in flight; the request replaced the pending one
    Superseded,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(rotation: i32) -> RenderTarget {
        RenderTarget::Fit { rotation }
    }

    #[test]
    fn first_request_starts_rendering() {
        let mut state = RenderState::new();
        let effect = state.apply(Command::Request(fit(0)));
        assert!(matches!(effect, Effect::Start { target, .. } if target == fit(0)));
        assert_eq!(state.phase(), RenderPhase::Rendering);
    }

    #[test]
    fn second_request_cancels_active_render() {
        let mut state = RenderState::new();
        let Effect::Start { token, .. } = state.apply(Command::Request(fit(0))) else {
            panic!("expected start");
        };

        let effect = state.apply(Command::Request(fit(90)));
        assert!(matches!(effect, Effect::Cancelled));
        assert!(token.is_cancelled());
        assert_eq!(state.phase(), RenderPhase::Cancelling);
    }

    #[test]
    fn requests_while_cancelling_keep_only_the_latest() {
        let mut state = RenderState::new();
        let _ = state.apply(Command::Request(fit(0)));
        let _ = state.apply(Command::Request(fit(90)));
        let effect = state.apply(Command::Request(fit(180)));
        assert!(matches!(effect, Effect::Superseded));
        assert_eq!(state.pending(), Some(&fit(180)));
    }

    #[test]
    fn settle_restarts_with_latest_pending_request() {
        let mut state = RenderState::new();
        let _ = state.apply(Command::Request(fit(0)));
        let _ = state.apply(Command::Request(fit(90)));
        let _ = state.apply(Command::Request(fit(270)));

        let Effect::Start { target, token } = state.apply(Command::Settle) else {
            panic!("expected restart");
        };
        assert_eq!(target, fit(270));
        assert!(!token.is_cancelled());
        assert_eq!(state.phase(), RenderPhase::Rendering);

        assert!(matches!(state.apply(Command::Settle), Effect::None));
        assert_eq!(state.phase(), RenderPhase::Idle);
    }

    #[test]
    fn abort_cancels_and_drops_pending() {
        let mut state = RenderState::new();
        let Effect::Start { token, .. } = state.apply(Command::Request(fit(0))) else {
            panic!("expected start");
        };
        let _ = state.apply(Command::Request(fit(90)));
        let _ = state.apply(Command::Abort);
        assert!(token.is_cancelled());
        assert!(state.pending().is_none());

        assert!(matches!(state.apply(Command::Settle), Effect::None));
        assert_eq!(state.phase(), RenderPhase::Idle);
    }
}
