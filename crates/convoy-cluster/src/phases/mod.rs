//! Phase handlers for the cluster reconciler.
//!
//! Each lifecycle phase that touches the remote service is handled by a
//! dedicated module. Handlers run sequentially and never retry a rejected
//! call; any failure aborts the handler with the section that was in flight.

mod creating;
mod deleting;
mod updating;

pub use creating::handle_creating;
pub use deleting::handle_deleting;
pub use updating::handle_updating;

use tracing::{debug, info};

use convoy_common::types::{ClusterId, ClusterPhase};
use convoy_common::Error;

/// Move the cluster from `from` to `to`, rejecting transitions the lifecycle forbids.
///
/// Staying in the same phase is a no-op.
pub(crate) fn transition(
    id: &ClusterId,
    from: ClusterPhase,
    to: ClusterPhase,
) -> Result<ClusterPhase, Error> {
    if from == to {
        debug!(cluster = %id, phase = %to, "phase unchanged");
        return Ok(to);
    }
    if !from.can_transition_to(to) {
        return Err(Error::internal_with_context(
            "lifecycle",
            format!("cluster {id} cannot move from {from} to {to}"),
        ));
    }
    info!(cluster = %id, from = %from, to = %to, "phase transition");
    Ok(to)
}
