use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier shared by agents and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Which half of the problem an agent belongs to.
///
/// Fire brigades are assigned to fires, police forces to blockades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Fire,
    Police,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Fire, Role::Police];

    pub fn other(self) -> Role {
        match self {
            Role::Fire => Role::Police,
            Role::Police => Role::Fire,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Fire => f.write_str("fire"),
            Role::Police => f.write_str("police"),
        }
    }
}
