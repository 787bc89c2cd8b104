//! Read-only world snapshot consumed by the problem model.
//!
//! The solver never mutates the world; the caller rebuilds a snapshot for
//! every simulation timestep.

use crate::ids::{EntityId, Role};
use serde::{Deserialize, Serialize};

/// Planar position in millimetres, like the rescue kernel reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Location) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: EntityId,
    pub role: Role,
    /// `None` when the kernel has not reported a position yet.
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireState {
    pub id: EntityId,
    pub location: Location,
    /// Burning intensity in `(0, 1]`; higher burns hotter.
    pub intensity: f64,
    /// Ground area of the burning building in square metres.
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockadeState {
    pub id: EntityId,
    pub location: Location,
    pub repair_cost: f64,
}

/// A fire brigade's route to a fire passes through a blockade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockedRoute {
    pub agent: EntityId,
    pub fire: EntityId,
    pub blockade: EntityId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Simulation time this snapshot was taken at.
    #[serde(default)]
    pub time: u32,
    #[serde(default)]
    pub agents: Vec<AgentState>,
    #[serde(default)]
    pub fires: Vec<FireState>,
    #[serde(default)]
    pub blockades: Vec<BlockadeState>,
    #[serde(default)]
    pub blocked_routes: Vec<BlockedRoute>,
}

impl WorldSnapshot {
    pub fn agents_with_role(&self, role: Role) -> impl Iterator<Item = &AgentState> {
        self.agents.iter().filter(move |a| a.role == role)
    }
}
