use crate::*;
use serde::{Deserialize, Serialize};

pub use random::*;

mod random;

/// Best-effort bound on re-rolls when a fresh layout repeats the previous
/// game exactly; any layout is accepted after that.
pub const MAX_LAYOUT_RETRIES: u32 = 8;

pub trait MinefieldGenerator {
    fn generate(self, config: GameConfig) -> MineLayout;
}

/// First-click safety policy applied during generation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StartCell {
    /// No exclusion, the start cell may hold a mine.
    Random,
    /// Exclude only the start cell itself.
    SimpleSafe,
    /// Exclude the start cell and its 8 neighbors.
    AlwaysZero,
}
