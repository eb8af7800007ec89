use tracing::debug;

use super::{BindingState, ResolvedBindings, StateLog, StateResolver};
use crate::error::ImportError;
use crate::selector::DrawCallEvent;

/// Rescans the log backward from every draw to the start of the capture.
///
/// Quadratic in the number of draws, but each draw is resolved in isolation,
/// which makes it the reference the experimental resolver is checked against.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyResolver;

impl LegacyResolver {
    pub fn resolve_one(
        &self,
        log: &StateLog,
        draw: &DrawCallEvent,
    ) -> Result<ResolvedBindings, ImportError> {
        let end = log.prefix_len(draw.chunk);
        let mut state = BindingState::default();
        for logged in log.events()[..end].iter().rev() {
            state.fill(&logged.event);
        }
        state.resolve(log, draw)
    }
}

impl StateResolver for LegacyResolver {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn resolve_all(
        &self,
        log: &StateLog,
        draws: &[DrawCallEvent],
    ) -> Vec<Result<ResolvedBindings, ImportError>> {
        debug!("Legacy resolver: {} draws", draws.len());
        draws.iter().map(|draw| self.resolve_one(log, draw)).collect()
    }
}
