use glam::{Mat4, Vec3, Vec4};
use mapsmodels_capture::{DrawParams, IndexFormat, Topology};
use mapsmodels_core::ResourceId;
use proptest::prelude::*;

use crate::selector::{select_draw_calls, DrawCallEvent};
use crate::state::{
    ExperimentalResolver, LegacyResolver, LoggedEvent, MatrixSlot, ResourceKind, StateEvent,
    StateLog, StateResolver,
};
use crate::testing::{open, tile_capture};
use crate::verify::{same_resolution, verify_strategies};

#[derive(Debug, Clone)]
enum Op {
    Create { id: u64, kind: ResourceKind },
    VertexBuffer { slot: u32, id: u64, offset: u32 },
    IndexBuffer { id: u64, wide: bool, offset: u32 },
    Texture { slot: u32, id: u64 },
    Program { id: u64 },
    Matrix { slot: MatrixSlot, x: f32 },
    UvTransform { scale: f32 },
    Draw { indexed: bool },
}

// Small id and slot ranges so bindings collide, shadow and get recreated often.
const MAX_ID: u64 = 5;
const MAX_OPS: usize = 80;

fn kind_strategy() -> impl Strategy<Value = ResourceKind> {
    prop_oneof![
        Just(ResourceKind::Buffer),
        Just(ResourceKind::Texture),
        Just(ResourceKind::Program),
    ]
}

fn matrix_slot_strategy() -> impl Strategy<Value = MatrixSlot> {
    prop_oneof![
        Just(MatrixSlot::Model),
        Just(MatrixSlot::View),
        Just(MatrixSlot::Projection),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // id 0 is an explicit unbind
    let id = 0..=MAX_ID;
    prop_oneof![
        3 => (1..=MAX_ID, kind_strategy()).prop_map(|(id, kind)| Op::Create { id, kind }),
        3 => (0u32..3, id.clone(), 0u32..64).prop_map(|(slot, id, offset)| Op::VertexBuffer { slot, id, offset }),
        1 => (id.clone(), any::<bool>(), 0u32..64).prop_map(|(id, wide, offset)| Op::IndexBuffer { id, wide, offset }),
        2 => (0u32..3, id.clone()).prop_map(|(slot, id)| Op::Texture { slot, id }),
        2 => id.prop_map(|id| Op::Program { id }),
        2 => (matrix_slot_strategy(), -100.0f32..100.0).prop_map(|(slot, x)| Op::Matrix { slot, x }),
        1 => matrix_slot_strategy().prop_map(|slot| Op::Matrix { slot, x: f32::NAN }),
        1 => (0.5f32..4.0).prop_map(|scale| Op::UvTransform { scale }),
        3 => any::<bool>().prop_map(|indexed| Op::Draw { indexed }),
    ]
}

/// Turn ops into a log (one chunk per op) and the draws found in it.
fn build(ops: &[Op]) -> (StateLog, Vec<DrawCallEvent>) {
    let mut events = Vec::new();
    let mut draws = Vec::new();

    for (chunk, op) in ops.iter().enumerate() {
        let event = match *op {
            Op::Create { id, kind } => StateEvent::Created {
                id: ResourceId(id),
                kind,
            },
            Op::VertexBuffer { slot, id, offset } => StateEvent::VertexBuffer {
                slot,
                buffer: ResourceId(id),
                offset,
            },
            Op::IndexBuffer { id, wide, offset } => StateEvent::IndexBuffer {
                buffer: ResourceId(id),
                format: if wide { IndexFormat::U32 } else { IndexFormat::U16 },
                offset,
            },
            Op::Texture { slot, id } => StateEvent::Texture {
                slot,
                texture: ResourceId(id),
            },
            Op::Program { id } => StateEvent::Program {
                program: ResourceId(id),
            },
            Op::Matrix { slot, x } => StateEvent::Matrix {
                slot,
                value: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
            },
            Op::UvTransform { scale } => StateEvent::Vector {
                slot: 0,
                value: Vec4::new(0.0, 0.0, scale, scale),
            },
            Op::Draw { indexed } => {
                draws.push(DrawCallEvent {
                    sequence: draws.len(),
                    chunk,
                    frame: None,
                    params: DrawParams {
                        topology: Topology::TriangleList,
                        count: 3,
                        first: 0,
                        base_vertex: 0,
                        indexed,
                    },
                });
                continue;
            }
        };
        events.push(LoggedEvent { chunk, event });
    }

    (StateLog::from_events(events), draws)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_resolvers_agree(ops in prop::collection::vec(op_strategy(), 0..MAX_OPS)) {
        let (log, draws) = build(&ops);
        let legacy = LegacyResolver.resolve_all(&log, &draws);
        let experimental = ExperimentalResolver.resolve_all(&log, &draws);
        prop_assert_eq!(legacy.len(), experimental.len());
        for (l, e) in legacy.iter().zip(&experimental) {
            prop_assert!(same_resolution(l, e), "{:?} != {:?}", l, e);
        }
        prop_assert!(verify_strategies(&log, &draws).is_ok());
    }

    #[test]
    fn prop_resolvers_agree_out_of_order(ops in prop::collection::vec(op_strategy(), 0..MAX_OPS)) {
        let (log, mut draws) = build(&ops);
        draws.reverse();
        let legacy = LegacyResolver.resolve_all(&log, &draws);
        let experimental = ExperimentalResolver.resolve_all(&log, &draws);
        for (l, e) in legacy.iter().zip(&experimental) {
            prop_assert!(same_resolution(l, e), "{:?} != {:?}", l, e);
        }
    }

    #[test]
    fn prop_max_blocks_is_a_prefix(count in 1usize..12, max_blocks in -3i64..16) {
        let capture = open(&tile_capture(count));
        let selection = select_draw_calls(&capture, max_blocks, None).unwrap();

        let expected = if max_blocks <= 0 {
            count
        } else {
            count.min(max_blocks as usize)
        };
        let sequences: Vec<usize> = selection.draws.iter().map(|d| d.sequence).collect();
        prop_assert_eq!(sequences, (0..expected).collect::<Vec<_>>());
        prop_assert_eq!(selection.truncated, max_blocks > 0 && (max_blocks as usize) <= count);
    }
}
