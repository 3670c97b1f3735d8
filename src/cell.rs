use serde::{Deserialize, Serialize};

/// Player-visible state of a single board cell.
///
/// `Mine`, `Exploded` and `WrongFlag` only appear once the game is over and
/// exist for end-of-game presentation: the triggered mine, the remaining
/// mines, and flags that turned out to sit on safe cells.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellView {
    Hidden,
    Revealed(u8),
    Flagged,
    Mine,
    Exploded,
    WrongFlag,
}

impl CellView {
    pub const fn is_revealed(self) -> bool {
        matches!(self, Self::Revealed(_) | Self::Mine | Self::Exploded)
    }

    /// Whether the cell still shows a covered face.
    pub const fn is_covered(self) -> bool {
        matches!(self, Self::Hidden | Self::Flagged | Self::WrongFlag)
    }
}

impl Default for CellView {
    fn default() -> Self {
        Self::Hidden
    }
}
