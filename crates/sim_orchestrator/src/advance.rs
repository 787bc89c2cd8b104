//! Minimal world dynamics between timesteps.
//!
//! Not a fire simulation: just enough change for the next timestep's
//! problem to differ from the last one. Fires with enough brigades cool
//! down, neglected fires grow, and attended blockades are cleared together
//! with the routes they cut.

use dcop::{Assignment, EntityId, WorldSnapshot};
use std::collections::{HashMap, HashSet};

const FULL_CREW_COOLING: f64 = 0.3;
const PARTIAL_CREW_COOLING: f64 = 0.1;
const NEGLECT_GROWTH: f64 = 0.05;
const NEGLECT_SPREAD: f64 = 1.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub extinguished: usize,
    pub cleared: usize,
}

/// Applies one timestep of dynamics. `agent_power` is the fire volume one
/// brigade handles, as in the problem configuration.
pub fn advance(world: &mut WorldSnapshot, assignment: &Assignment, agent_power: f64) -> AdvanceReport {
    let mut crews: HashMap<EntityId, u32> = HashMap::new();
    for (_, target) in assignment.iter() {
        *crews.entry(target).or_insert(0) += 1;
    }

    for fire in &mut world.fires {
        let volume = fire.intensity.max(0.0) * fire.area.max(0.0);
        let required = ((volume / agent_power).ceil() as u32).max(1);
        let crew = crews.get(&fire.id).copied().unwrap_or(0);
        if crew >= required {
            fire.intensity -= FULL_CREW_COOLING;
        } else if crew > 0 {
            fire.intensity -= PARTIAL_CREW_COOLING * f64::from(crew) / f64::from(required);
        } else {
            fire.intensity = (fire.intensity + NEGLECT_GROWTH).min(1.0);
            fire.area *= NEGLECT_SPREAD;
        }
    }
    let fires_before = world.fires.len();
    world.fires.retain(|fire| fire.intensity > 0.0);

    let blockades_before = world.blockades.len();
    world.blockades.retain(|blockade| !crews.contains_key(&blockade.id));

    let fires: HashSet<EntityId> = world.fires.iter().map(|f| f.id).collect();
    let blockades: HashSet<EntityId> = world.blockades.iter().map(|b| b.id).collect();
    world
        .blocked_routes
        .retain(|route| fires.contains(&route.fire) && blockades.contains(&route.blockade));

    world.time += 1;
    let report = AdvanceReport {
        extinguished: fires_before - world.fires.len(),
        cleared: blockades_before - world.blockades.len(),
    };
    tracing::debug!(
        time = world.time,
        fires = world.fires.len(),
        blockades = world.blockades.len(),
        extinguished = report.extinguished,
        cleared = report.cleared,
        "Advanced world"
    );
    report
}
