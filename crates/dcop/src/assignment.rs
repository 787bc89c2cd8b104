use crate::ids::EntityId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Agent → target mapping produced by one solve.
///
/// Each agent appears at most once. An agent without an entry has no
/// target (UNKNOWN); targets may be shared by several agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assignment {
    targets: BTreeMap<EntityId, EntityId>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or clears, with `None`) the target of `agent`.
    pub fn assign(&mut self, agent: EntityId, target: Option<EntityId>) {
        match target {
            Some(target) => {
                self.targets.insert(agent, target);
            }
            None => {
                self.targets.remove(&agent);
            }
        }
    }

    pub fn target(&self, agent: EntityId) -> Option<EntityId> {
        self.targets.get(&agent).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, EntityId)> + '_ {
        self.targets.iter().map(|(a, t)| (*a, *t))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of agents currently on each target.
    pub fn target_counts(&self) -> BTreeMap<EntityId, u32> {
        let mut counts = BTreeMap::new();
        for target in self.targets.values() {
            *counts.entry(*target).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<(EntityId, EntityId)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (EntityId, EntityId)>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
        }
    }
}
