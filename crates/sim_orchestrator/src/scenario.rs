//! Initial world: loaded from a TOML scenario file or generated at random.

use anyhow::Context;
use dcop::{
    AgentState, BlockadeState, BlockedRoute, EntityId, FireState, Location, Role, WorldSnapshot,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;

const FIRE_ID_BASE: u32 = 1_000;
const BLOCKADE_ID_BASE: u32 = 2_000;

pub fn load(path: &Path) -> anyhow::Result<WorldSnapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    parse(&contents).with_context(|| format!("Invalid scenario {}", path.display()))
}

pub fn parse(contents: &str) -> anyhow::Result<WorldSnapshot> {
    let world: WorldSnapshot = toml::from_str(contents).context("Failed to parse scenario TOML")?;
    tracing::info!(
        agents = world.agents.len(),
        fires = world.fires.len(),
        blockades = world.blockades.len(),
        blocked_routes = world.blocked_routes.len(),
        "Loaded scenario"
    );
    Ok(world)
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    pub fire_agents: u32,
    pub police_agents: u32,
    pub fires: u32,
    pub blockades: u32,
    pub blocked_routes: u32,
    pub map_size: f64,
}

/// Random world with agents numbered from 1, fires from 1000 and
/// blockades from 2000.
pub fn generate(config: &GeneratorConfig, seed: u64) -> WorldSnapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let size = config.map_size.max(1.0);
    let location = |rng: &mut StdRng| Location::new(rng.gen_range(0.0..size), rng.gen_range(0.0..size));

    let mut agents = Vec::new();
    for i in 0..config.fire_agents + config.police_agents {
        agents.push(AgentState {
            id: EntityId(i + 1),
            role: if i < config.fire_agents { Role::Fire } else { Role::Police },
            location: Some(location(&mut rng)),
        });
    }

    let fires: Vec<FireState> = (0..config.fires)
        .map(|i| FireState {
            id: EntityId(FIRE_ID_BASE + i),
            location: location(&mut rng),
            intensity: rng.gen_range(0.2..1.0),
            area: rng.gen_range(200.0..4_000.0),
        })
        .collect();

    let blockades: Vec<BlockadeState> = (0..config.blockades)
        .map(|i| BlockadeState {
            id: EntityId(BLOCKADE_ID_BASE + i),
            location: location(&mut rng),
            repair_cost: rng.gen_range(5.0..60.0),
        })
        .collect();

    let brigades: Vec<EntityId> = agents
        .iter()
        .filter(|a| a.role == Role::Fire)
        .map(|a| a.id)
        .collect();
    let mut blocked_routes = Vec::new();
    if !brigades.is_empty() && !fires.is_empty() && !blockades.is_empty() {
        for _ in 0..config.blocked_routes {
            let (Some(agent), Some(fire), Some(blockade)) = (
                brigades.choose(&mut rng),
                fires.choose(&mut rng),
                blockades.choose(&mut rng),
            ) else {
                break;
            };
            let route = BlockedRoute {
                agent: *agent,
                fire: fire.id,
                blockade: blockade.id,
            };
            // one blockade per route is enough
            if !blocked_routes
                .iter()
                .any(|r: &BlockedRoute| r.agent == route.agent && r.fire == route.fire)
            {
                blocked_routes.push(route);
            }
        }
    }

    WorldSnapshot {
        time: 0,
        agents,
        fires,
        blockades,
        blocked_routes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
time = 3

[[agents]]
id = 1
role = "fire"
location = { x = 0.0, y = 0.0 }

[[agents]]
id = 2
role = "police"

[[fires]]
id = 10
location = { x = 500.0, y = 0.0 }
intensity = 0.5
area = 1000.0

[[blockades]]
id = 20
location = { x = 250.0, y = 0.0 }
repair_cost = 12.0

[[blocked_routes]]
agent = 1
fire = 10
blockade = 20
"#;

    fn generator() -> GeneratorConfig {
        GeneratorConfig {
            fire_agents: 4,
            police_agents: 2,
            fires: 3,
            blockades: 2,
            blocked_routes: 3,
            map_size: 10_000.0,
        }
    }

    #[test]
    fn test_parse_scenario() {
        let world = parse(SCENARIO).unwrap();
        assert_eq!(world.time, 3);
        assert_eq!(world.agents.len(), 2);
        assert_eq!(world.agents[1].location, None);
        assert_eq!(world.fires[0].id, EntityId(10));
        assert_eq!(world.blocked_routes[0].blockade, EntityId(20));
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert!(parse("[[agents]]\nid = 1\nrole = \"ambulance\"\n").is_err());
    }

    #[test]
    fn test_generator_is_seeded() {
        assert_eq!(generate(&generator(), 42), generate(&generator(), 42));
        assert_ne!(generate(&generator(), 42), generate(&generator(), 43));
    }

    #[test]
    fn test_generated_world_is_consistent() {
        let world = generate(&generator(), 9);
        assert_eq!(world.agents_with_role(Role::Fire).count(), 4);
        assert_eq!(world.agents_with_role(Role::Police).count(), 2);
        assert!(world.blocked_routes.len() <= 3);
        for route in &world.blocked_routes {
            assert!(world.fires.iter().any(|f| f.id == route.fire));
            assert!(world.blockades.iter().any(|b| b.id == route.blockade));
        }
    }
}
