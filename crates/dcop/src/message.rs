//! Message kinds exchanged by the agent strategies.

use crate::comm::{MessageCategory, Payload};
use crate::factor_graph::FactorId;
use crate::ids::{EntityId, Role};

const ID_BYTES: usize = std::mem::size_of::<u32>();
const VALUE_BYTES: usize = std::mem::size_of::<f64>();

/// "Agent `agent` is currently heading to `target`" (or to nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentMessage {
    pub agent: EntityId,
    pub target: Option<EntityId>,
}

impl Payload for AssignmentMessage {
    fn byte_size(&self) -> usize {
        2 * ID_BYTES
    }
}

/// Direction of a binary max-sum message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeDirection {
    /// Selector (variable side) to cardinality factor.
    Q,
    /// Cardinality factor to selector.
    R,
}

/// Scalar max-sum message `m(1) − m(0)` along one factor-graph edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryMaxSumMessage {
    pub from: FactorId,
    pub to: FactorId,
    pub value: f64,
}

impl BinaryMaxSumMessage {
    pub fn direction(&self) -> EdgeDirection {
        match self.from {
            FactorId::Selector(_) => EdgeDirection::Q,
            FactorId::Cardinality(_) => EdgeDirection::R,
        }
    }
}

impl Payload for BinaryMaxSumMessage {
    fn byte_size(&self) -> usize {
        2 * ID_BYTES + VALUE_BYTES
    }
}

/// Messages of the composite fire/police team solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamMessage {
    /// Pick announced to same-role neighbours.
    Teammate(AssignmentMessage),
    /// Pick announced to the other role.
    CrossTeam { role: Role, pick: AssignmentMessage },
}

impl Payload for TeamMessage {
    fn byte_size(&self) -> usize {
        match self {
            TeamMessage::Teammate(pick) => pick.byte_size(),
            // one extra byte tags the sender's role
            TeamMessage::CrossTeam { pick, .. } => pick.byte_size() + 1,
        }
    }

    fn category(&self) -> MessageCategory {
        match self {
            TeamMessage::Teammate(_) => MessageCategory::Algorithm,
            TeamMessage::CrossTeam { .. } => MessageCategory::Other,
        }
    }
}
