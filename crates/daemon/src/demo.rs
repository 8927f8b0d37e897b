//! Demo variables driven by the `varpipe demo` command
//!
//! A tiny game loop: kills go up every tick, deaths every fifth kill, and hp
//! jumps around so `watch cat` has something to show.

use rand::Rng;
use tracing::trace;

use common::{CellError, IntVar, Registry, RegistryError, TextVar};

/// Buffer size of the player name, NUL terminator not included
pub const PLAYER_NAME_CAPACITY: usize = 63;

#[derive(Debug, Clone)]
pub struct DemoVariables {
    pub kills: IntVar,
    pub deaths: IntVar,
    pub hp: IntVar,
    pub level: IntVar,
    pub player_name: TextVar,
}

impl DemoVariables {
    pub fn new() -> Result<Self, CellError> {
        Ok(Self {
            kills: IntVar::new(0),
            deaths: IntVar::new(0),
            hp: IntVar::new(100),
            level: IntVar::new(1),
            player_name: TextVar::new(PLAYER_NAME_CAPACITY, "PlayerOne")?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), RegistryError> {
        registry.register_integer("player_kills", &self.kills)?;
        registry.register_integer("player_deaths", &self.deaths)?;
        registry.register_integer("player_hp", &self.hp)?;
        registry.register_integer("level", &self.level)?;
        registry.register_text("player_name", &self.player_name)?;
        Ok(())
    }

    /// Advance the game by one step.
    ///
    /// Counters saturate, since writes through the mount can park them at
    /// `i64::MAX`.
    pub fn tick(&self, rng: &mut impl Rng) {
        let kills = self.kills.update(|kills| kills.saturating_add(1));
        if kills % 5 == 0 {
            self.deaths.update(|deaths| deaths.saturating_add(1));
        }
        self.hp.set(rng.random_range(0..100));
        trace!(kills, hp = self.hp.get(), "tick");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::VarFsCore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_register_all() {
        let registry = Registry::new();
        let vars = DemoVariables::new().unwrap();
        vars.register(&registry).unwrap();

        assert_eq!(
            registry.names(),
            vec![
                "player_kills",
                "player_deaths",
                "player_hp",
                "level",
                "player_name"
            ]
        );
    }

    #[test]
    fn test_tick() {
        let vars = DemoVariables::new().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10 {
            vars.tick(&mut rng);
            assert!((0..100).contains(&vars.hp.get()));
        }
        assert_eq!(vars.kills.get(), 10);
        assert_eq!(vars.deaths.get(), 2);
        assert_eq!(vars.level.get(), 1);
        assert_eq!(vars.player_name.get(), "PlayerOne");
    }

    #[test]
    fn test_tick_after_external_max_write() {
        let registry = Arc::new(Registry::new());
        let vars = DemoVariables::new().unwrap();
        vars.register(&registry).unwrap();
        let core = VarFsCore::new(registry);
        let mut rng = StdRng::seed_from_u64(11);

        core.write("/player_kills", b"99999999999999999999999\n")
            .unwrap();
        assert_eq!(vars.kills.get(), i64::MAX);
        vars.tick(&mut rng);
        assert_eq!(vars.kills.get(), i64::MAX);

        // Kills land on a multiple of five, deaths is already pinned
        core.write("/player_kills", b"4\n").unwrap();
        core.write("/player_deaths", b"99999999999999999999999\n")
            .unwrap();
        vars.tick(&mut rng);
        assert_eq!(vars.kills.get(), 5);
        assert_eq!(vars.deaths.get(), i64::MAX);
    }
}
