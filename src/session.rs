use rand::prelude::*;

use crate::*;

/// Owns the active engine across consecutive games: difficulty changes,
/// per-game seeding, and the previous-layout memory feeding the best-effort
/// anti-repetition re-roll.
#[derive(Clone, Debug)]
pub struct GameSession {
    engine: MinefieldEngine,
    previous_layout: Option<MineLayout>,
    rng: SmallRng,
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        Self::with_seed(config, rand::rng().next_u64())
    }

    /// Deterministic session for tests and replays.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let engine = MinefieldEngine::new(config, rng.next_u64());
        Self {
            engine,
            previous_layout: None,
            rng,
        }
    }

    pub fn engine(&self) -> &MinefieldEngine {
        &self.engine
    }

    pub fn config(&self) -> GameConfig {
        self.engine.config()
    }

    /// Discards the current game and starts a fresh one, remembering the
    /// outgoing layout so the next generation avoids repeating it exactly.
    pub fn new_game(&mut self, config: GameConfig) {
        if let Some(layout) = self.engine.mine_layout() {
            self.previous_layout = Some(layout.clone());
        }
        self.engine = MinefieldEngine::new(config, self.rng.next_u64())
            .avoiding(self.previous_layout.clone());
    }

    /// Restarts with the current difficulty.
    pub fn restart(&mut self) {
        self.new_game(self.engine.config());
    }

    pub fn reveal(&mut self, coords: Coord2) -> Result<RevealOutcome> {
        self.engine.reveal(coords)
    }

    pub fn toggle_flag(&mut self, coords: Coord2) -> Result<FlagOutcome> {
        self.engine.toggle_flag(coords)
    }

    pub fn hint(&self) -> Option<Coord2> {
        self.engine.hint()
    }

    pub fn state(&self) -> GameState {
        self.engine.state()
    }
}
