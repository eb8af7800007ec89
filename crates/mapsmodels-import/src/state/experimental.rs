use tracing::debug;

use super::{BindingState, ResolvedBindings, StateLog, StateResolver};
use crate::error::ImportError;
use crate::selector::DrawCallEvent;

/// Folds the log forward once, snapshotting the state at every draw.
///
/// Draws are expected in capture order; a draw that lies before the cursor
/// restarts the fold from the beginning of the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExperimentalResolver;

impl StateResolver for ExperimentalResolver {
    fn name(&self) -> &'static str {
        "experimental"
    }

    fn resolve_all(
        &self,
        log: &StateLog,
        draws: &[DrawCallEvent],
    ) -> Vec<Result<ResolvedBindings, ImportError>> {
        debug!("Experimental resolver: {} draws", draws.len());
        let events = log.events();
        let mut state = BindingState::default();
        let mut cursor = 0;

        draws
            .iter()
            .map(|draw| {
                let end = log.prefix_len(draw.chunk);
                if end < cursor {
                    state = BindingState::default();
                    cursor = 0;
                }
                for logged in &events[cursor..end] {
                    state.apply(&logged.event);
                }
                cursor = end;
                state.resolve(log, draw)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use mapsmodels_core::ResourceId;

    use super::*;
    use crate::state::tests::draw_at;
    use crate::state::{LegacyResolver, LoggedEvent, ResourceKind, StateEvent};

    fn log() -> StateLog {
        let mut events = vec![
            LoggedEvent {
                chunk: 0,
                event: StateEvent::Created {
                    id: ResourceId(1),
                    kind: ResourceKind::Buffer,
                },
            },
            LoggedEvent {
                chunk: 1,
                event: StateEvent::Created {
                    id: ResourceId(2),
                    kind: ResourceKind::Program,
                },
            },
            LoggedEvent {
                chunk: 2,
                event: StateEvent::Program {
                    program: ResourceId(2),
                },
            },
        ];
        for (i, chunk) in [3, 5, 7].into_iter().enumerate() {
            events.push(LoggedEvent {
                chunk,
                event: StateEvent::VertexBuffer {
                    slot: 0,
                    buffer: ResourceId(1),
                    offset: i as u32 * 12,
                },
            });
        }
        StateLog::from_events(events)
    }

    #[test]
    fn snapshots_follow_the_log() {
        let log = log();
        let draws = [draw_at(0, 4, false), draw_at(1, 6, false), draw_at(2, 8, false)];
        let offsets: Vec<u32> = ExperimentalResolver
            .resolve_all(&log, &draws)
            .into_iter()
            .map(|r| r.unwrap().vertex_buffers[&0].offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn out_of_order_draws_restart_the_fold() {
        let log = log();
        let draws = [draw_at(0, 8, false), draw_at(1, 4, false)];
        let experimental = ExperimentalResolver.resolve_all(&log, &draws);
        let legacy = LegacyResolver.resolve_all(&log, &draws);
        assert_eq!(experimental, legacy);
        assert_eq!(experimental[1].as_ref().unwrap().vertex_buffers[&0].offset, 0);
    }

    #[test]
    fn draw_before_any_binding_is_unresolved() {
        let log = log();
        let results = ExperimentalResolver.resolve_all(&log, &[draw_at(0, 1, false)]);
        assert!(results[0].is_err());
    }
}
