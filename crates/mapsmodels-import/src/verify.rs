//! Cross-checking the two state resolvers

use tracing::debug;

use crate::error::ImportError;
use crate::selector::DrawCallEvent;
use crate::state::{
    ExperimentalResolver, LegacyResolver, ResolvedBindings, StateLog, StateResolver,
};

/// Both results agree, with matrices and vectors compared bit for bit.
pub fn same_resolution(
    a: &Result<ResolvedBindings, ImportError>,
    b: &Result<ResolvedBindings, ImportError>,
) -> bool {
    match (a, b) {
        (Ok(a), Ok(b)) => a.bit_identical(b),
        (Err(a), Err(b)) => a == b,
        _ => false,
    }
}

/// Resolve every draw with both resolvers and fail on the first draw whose
/// results differ.
pub fn verify_strategies(log: &StateLog, draws: &[DrawCallEvent]) -> Result<(), ImportError> {
    let legacy = LegacyResolver.resolve_all(log, draws);
    let experimental = ExperimentalResolver.resolve_all(log, draws);

    for ((draw, l), e) in draws.iter().zip(&legacy).zip(&experimental) {
        if !same_resolution(l, e) {
            return Err(ImportError::StrategyDivergence {
                draw: draw.sequence,
                legacy: format!("{l:?}"),
                experimental: format!("{e:?}"),
            });
        }
    }

    debug!("Resolvers agree on {} draws", draws.len());
    Ok(())
}
