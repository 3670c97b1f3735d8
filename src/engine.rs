use core::num::Saturating;
use ndarray::Array2;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::*;

/// Valid transitions:
/// - Pending -> Running (first reveal)
/// - Pending | Running -> Won
/// - Pending | Running -> Lost
///
/// Won and Lost are terminal, a fresh engine is required to keep playing.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameState {
    Pending,
    Running,
    Won,
    Lost,
}

impl GameState {
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Owns the grid and every game-state transition for one game.
///
/// Mine placement is deferred to the first reveal so the first click is
/// always safe; engines built over a pre-placed [`MineLayout`] enforce the
/// same guarantee by relocating the mine under the first click.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinefieldEngine {
    config: GameConfig,
    layout: Option<MineLayout>,
    board: Array2<CellView>,
    revealed_count: Saturating<CellCount>,
    flagged_count: Saturating<CellCount>,
    state: GameState,
    seed: u64,
    start_cell: StartCell,
    avoid_layout: Option<MineLayout>,
    first_move_taken: bool,
}

impl MinefieldEngine {
    /// New game with unplaced mines; placement happens at the first reveal,
    /// excluding the clicked cell per [`StartCell::SimpleSafe`].
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            layout: None,
            board: Array2::default(config.size.to_nd_index()),
            revealed_count: Saturating(0),
            flagged_count: Saturating(0),
            state: Default::default(),
            seed,
            start_cell: StartCell::SimpleSafe,
            avoid_layout: None,
            first_move_taken: false,
        }
    }

    /// New game over an explicit mine layout (replays, tests).
    pub fn with_layout(layout: MineLayout, seed: u64) -> Self {
        let config = layout.game_config();
        Self {
            layout: Some(layout),
            ..Self::new(config, seed)
        }
    }

    pub fn start_cell_policy(mut self, start_cell: StartCell) -> Self {
        self.start_cell = start_cell;
        self
    }

    /// Best-effort anti-repetition: generation re-rolls a bounded number of
    /// times while the fresh layout equals `previous` exactly.
    pub fn avoiding(mut self, previous: Option<MineLayout>) -> Self {
        self.avoid_layout = previous;
        self
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn size(&self) -> Coord2 {
        self.config.size
    }

    pub fn total_mines(&self) -> CellCount {
        self.config.mines
    }

    pub fn flag_count(&self) -> CellCount {
        self.flagged_count.0
    }

    pub fn revealed_count(&self) -> CellCount {
        self.revealed_count.0
    }

    /// How many mines have not been flagged yet, negative when over-flagged.
    pub fn mines_left(&self) -> isize {
        (self.config.mines as isize) - (self.flagged_count.0 as isize)
    }

    pub fn first_move_taken(&self) -> bool {
        self.first_move_taken
    }

    pub fn cell_at(&self, coords: Coord2) -> CellView {
        self.board[coords.to_nd_index()]
    }

    /// Full board snapshot in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (Coord2, CellView)> + '_ {
        self.board
            .indexed_iter()
            .map(|((x, y), &view)| ((x as Coord, y as Coord), view))
    }

    /// `None` until mines are placed by the first reveal.
    pub fn mine_layout(&self) -> Option<&MineLayout> {
        self.layout.as_ref()
    }

    /// Reveals a cell. No-op when it is already revealed or flagged; ends the
    /// game when it holds a mine; flood-fills from zero-adjacency cells.
    pub fn reveal(&mut self, coords: Coord2) -> Result<RevealOutcome> {
        let coords = self.validate_coords(coords)?;
        self.check_not_finished()?;

        if self.board[coords.to_nd_index()] != CellView::Hidden {
            return Ok(RevealOutcome::NoChange);
        }

        if !self.first_move_taken {
            self.ensure_minefield(coords);
            self.first_move_taken = true;
        }
        self.mark_started();

        Ok(self.reveal_single_cell(coords))
    }

    /// Flips the flag on a covered cell, keeping the flag counter floored at
    /// zero. Adding a flag re-evaluates the all-mines-flagged win path.
    pub fn toggle_flag(&mut self, coords: Coord2) -> Result<FlagOutcome> {
        use CellView::*;
        use FlagOutcome::*;

        let coords = self.validate_coords(coords)?;
        self.check_not_finished()?;

        Ok(match self.board[coords.to_nd_index()] {
            Hidden => {
                self.board[coords.to_nd_index()] = Flagged;
                self.flagged_count += 1;
                if self.check_flag_win() {
                    Won
                } else {
                    Changed
                }
            }
            Flagged => {
                self.board[coords.to_nd_index()] = Hidden;
                self.flagged_count -= 1;
                Changed
            }
            _ => NoChange,
        })
    }

    /// Coordinates of an arbitrary covered, unflagged mine for a temporary
    /// highlight, or `None` when no such cell exists. Never mutates state.
    pub fn hint(&self) -> Option<Coord2> {
        if self.state.is_finished() {
            return None;
        }
        let layout = self.layout.as_ref()?;
        layout
            .iter_mines()
            .find(|&pos| self.board[pos.to_nd_index()] == CellView::Hidden)
    }

    /// Places mines on the first reveal, or relocates the mine under the
    /// first click when the layout was pre-placed.
    fn ensure_minefield(&mut self, start: Coord2) {
        if self.layout.is_none() {
            let mut seed_rng = SmallRng::seed_from_u64(self.seed);
            let mut layout =
                RandomMinefieldGenerator::new(seed_rng.next_u64(), start, self.start_cell)
                    .generate(self.config);

            if let Some(previous) = &self.avoid_layout {
                let mut attempt = 0;
                while attempt < MAX_LAYOUT_RETRIES && layout == *previous {
                    attempt += 1;
                    log::debug!("Layout repeats the previous game, re-rolling ({})", attempt);
                    layout =
                        RandomMinefieldGenerator::new(seed_rng.next_u64(), start, self.start_cell)
                            .generate(self.config);
                }
            }

            self.layout = Some(layout);
        }

        // pre-placed layouts (and the Random policy) may still mine the
        // first click; relocation restores the first-move guarantee
        if let Some(layout) = self.layout.as_mut() {
            if layout[start] {
                log::debug!("First reveal hit a mine at {:?}, relocating it", start);
                let mut rng = SmallRng::seed_from_u64(self.seed);
                layout.relocate_mine(start, &mut rng);
            }
        }
    }

    fn reveal_single_cell(&mut self, coords: Coord2) -> RevealOutcome {
        use CellView::*;
        use RevealOutcome::*;

        let Some(layout) = &self.layout else {
            return NoChange;
        };

        match (self.board[coords.to_nd_index()], layout[coords]) {
            (Hidden, true) => {
                self.board[coords.to_nd_index()] = Exploded;
                self.end_game(false);
                HitMine
            }
            (Hidden, false) => {
                let adjacent_mines = layout.adjacent_mine_count(coords);
                self.board[coords.to_nd_index()] = CellView::Revealed(adjacent_mines);
                self.revealed_count += 1;
                log::debug!("Revealed {:?}, adjacent mines: {}", coords, adjacent_mines);

                if adjacent_mines == 0 {
                    let mut visited = HashSet::from([coords]);
                    let mut to_visit: VecDeque<_> = layout
                        .iter_neighbors(coords)
                        .filter(|&pos| self.board[pos.to_nd_index()] == Hidden)
                        .collect();

                    while let Some(visit_coords) = to_visit.pop_front() {
                        if !visited.insert(visit_coords) {
                            continue;
                        }

                        // skip flagged and already revealed cells
                        if self.board[visit_coords.to_nd_index()] != Hidden {
                            continue;
                        }

                        let visit_adjacent = layout.adjacent_mine_count(visit_coords);
                        self.board[visit_coords.to_nd_index()] = CellView::Revealed(visit_adjacent);
                        self.revealed_count += 1;
                        log::trace!(
                            "Flood revealed {:?}, adjacent mines: {}",
                            visit_coords,
                            visit_adjacent
                        );

                        if visit_adjacent == 0 {
                            to_visit.extend(
                                layout
                                    .iter_neighbors(visit_coords)
                                    .filter(|&pos| self.board[pos.to_nd_index()] == Hidden)
                                    .filter(|pos| !visited.contains(pos)),
                            );
                        }
                    }
                }

                let won = self.revealed_count.0 == layout.safe_cell_count();
                if won {
                    self.end_game(true);
                    Won
                } else {
                    RevealOutcome::Revealed
                }
            }
            _ => NoChange,
        }
    }

    /// Alternate win trigger: every mine flagged with exactly `mines` flags.
    /// Auto-reveals the remaining safe cells before declaring the win.
    fn check_flag_win(&mut self) -> bool {
        let Some(layout) = &self.layout else {
            return false;
        };
        if self.flagged_count.0 != layout.mine_count() || layout.mine_count() == 0 {
            return false;
        }
        if !layout
            .iter_mines()
            .all(|pos| self.board[pos.to_nd_index()] == CellView::Flagged)
        {
            return false;
        }

        self.reveal_remaining_safe_cells();
        self.end_game(true);
        true
    }

    fn reveal_remaining_safe_cells(&mut self) {
        let Some(layout) = &self.layout else {
            return;
        };
        let (size_x, size_y) = layout.size();
        for x in 0..size_x {
            for y in 0..size_y {
                let coords = (x, y);
                if layout.contains_mine(coords) {
                    continue;
                }
                if self.board[coords.to_nd_index()] == CellView::Hidden {
                    self.board[coords.to_nd_index()] =
                        CellView::Revealed(layout.adjacent_mine_count(coords));
                    self.revealed_count += 1;
                }
            }
        }
    }

    fn mark_started(&mut self) {
        if self.state.is_pending() {
            self.state = GameState::Running;
        }
    }

    fn end_game(&mut self, won: bool) {
        if self.state.is_finished() {
            return;
        }
        self.state = if won { GameState::Won } else { GameState::Lost };
        if won {
            self.flag_remaining_mines();
        } else {
            self.uncover_all_mines();
        }
    }

    /// On a win every unflagged mine gets an automatic flag.
    fn flag_remaining_mines(&mut self) {
        let Some(layout) = &self.layout else {
            return;
        };
        for coords in layout.iter_mines() {
            if self.board[coords.to_nd_index()] == CellView::Hidden {
                self.board[coords.to_nd_index()] = CellView::Flagged;
                self.flagged_count += 1;
            }
        }
    }

    /// On a loss every mine reads as revealed and misplaced flags are marked.
    fn uncover_all_mines(&mut self) {
        let Some(layout) = &self.layout else {
            return;
        };
        let (size_x, size_y) = layout.size();
        for x in 0..size_x {
            for y in 0..size_y {
                let coords = (x, y);
                let view = self.board[coords.to_nd_index()];
                if layout.contains_mine(coords) {
                    if view != CellView::Exploded {
                        self.board[coords.to_nd_index()] = CellView::Mine;
                    }
                } else if view == CellView::Flagged {
                    self.board[coords.to_nd_index()] = CellView::WrongFlag;
                }
            }
        }
    }

    fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        if coords.0 < self.config.size.0 && coords.1 < self.config.size.1 {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    fn check_not_finished(&self) -> Result<()> {
        if self.state.is_finished() {
            Err(GameError::AlreadyEnded)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: Coord2, mines: &[Coord2]) -> MineLayout {
        MineLayout::from_mine_coords(size, mines).unwrap()
    }

    const BEGINNER_MINES: [Coord2; 10] = [
        (0, 0),
        (2, 1),
        (4, 4),
        (5, 7),
        (6, 2),
        (7, 7),
        (8, 0),
        (8, 4),
        (3, 8),
        (1, 5),
    ];

    #[test]
    fn deferred_placement_keeps_first_click_safe() {
        let mut engine = MinefieldEngine::new(GameConfig::beginner(), 1234);
        assert_eq!(engine.state(), GameState::Pending);
        assert!(engine.mine_layout().is_none());

        let outcome = engine.reveal((4, 4)).unwrap();

        assert_ne!(outcome, RevealOutcome::HitMine);
        assert!(engine.first_move_taken());
        let placed = engine.mine_layout().unwrap();
        assert_eq!(placed.mine_count(), 10);
        assert!(!placed.contains_mine((4, 4)));
        assert!(engine.cell_at((4, 4)).is_revealed());
    }

    #[test]
    fn always_zero_policy_makes_the_first_reveal_a_zero_cell() {
        let mut engine = MinefieldEngine::new(GameConfig::beginner(), 77)
            .start_cell_policy(StartCell::AlwaysZero);

        engine.reveal((4, 4)).unwrap();

        assert_eq!(engine.cell_at((4, 4)), CellView::Revealed(0));
        assert_eq!(engine.mine_layout().unwrap().mine_count(), 10);
    }

    #[test]
    fn first_reveal_on_preplaced_mine_relocates_it() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 99);

        let outcome = engine.reveal((4, 4)).unwrap();

        assert_ne!(outcome, RevealOutcome::HitMine);
        assert_eq!(engine.state(), GameState::Running);
        let placed = engine.mine_layout().unwrap();
        assert!(!placed.contains_mine((4, 4)));
        assert_eq!(placed.mine_count(), 10);
        let expected = placed.adjacent_mine_count((4, 4));
        assert_eq!(engine.cell_at((4, 4)), CellView::Revealed(expected));
    }

    #[test]
    fn revealing_a_mine_after_first_move_loses_and_uncovers_all_mines() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);
        engine.toggle_flag((0, 1)).unwrap(); // misplaced flag on a safe cell

        assert_eq!(engine.reveal((4, 5)).unwrap(), RevealOutcome::Revealed);
        assert_eq!(engine.reveal((0, 0)).unwrap(), RevealOutcome::HitMine);

        assert_eq!(engine.state(), GameState::Lost);
        assert_eq!(engine.cell_at((0, 0)), CellView::Exploded);
        for coords in BEGINNER_MINES.iter().skip(1) {
            assert_eq!(engine.cell_at(*coords), CellView::Mine);
        }
        assert_eq!(engine.cell_at((0, 1)), CellView::WrongFlag);

        // terminal state rejects further moves
        assert_eq!(engine.reveal((1, 1)), Err(GameError::AlreadyEnded));
        assert_eq!(engine.toggle_flag((1, 1)), Err(GameError::AlreadyEnded));
    }

    #[test]
    fn flood_fill_reveals_zero_region_and_numbered_frontier_once() {
        let mut engine = MinefieldEngine::with_layout(layout((4, 4), &[(3, 3)]), 5);

        let outcome = engine.reveal((0, 0)).unwrap();

        assert_eq!(outcome, RevealOutcome::Won);
        assert_eq!(engine.revealed_count(), 15);
        let actually_revealed = engine
            .iter_cells()
            .filter(|(_, view)| view.is_revealed())
            .count();
        assert_eq!(actually_revealed, 15);
        assert_eq!(engine.cell_at((2, 2)), CellView::Revealed(1));
        assert!(!engine.cell_at((3, 3)).is_revealed());
    }

    #[test]
    fn flood_fill_skips_flagged_cells() {
        let mut engine = MinefieldEngine::with_layout(layout((4, 4), &[(3, 3)]), 5);
        engine.toggle_flag((0, 3)).unwrap();

        engine.reveal((0, 0)).unwrap();

        assert_eq!(engine.cell_at((0, 3)), CellView::Flagged);
        assert!(!engine.cell_at((0, 3)).is_revealed());
    }

    #[test]
    fn reveal_is_a_no_op_on_revealed_and_flagged_cells() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);
        assert_eq!(engine.reveal((4, 5)).unwrap(), RevealOutcome::Revealed);
        assert_eq!(engine.reveal((4, 5)).unwrap(), RevealOutcome::NoChange);

        engine.toggle_flag((2, 2)).unwrap();
        assert_eq!(engine.reveal((2, 2)).unwrap(), RevealOutcome::NoChange);
        assert_eq!(engine.cell_at((2, 2)), CellView::Flagged);
    }

    #[test]
    fn revealing_all_safe_cells_wins_and_auto_flags_mines() {
        let mut engine = MinefieldEngine::with_layout(layout((2, 1), &[(0, 0)]), 3);

        assert_eq!(engine.reveal((1, 0)).unwrap(), RevealOutcome::Won);
        assert_eq!(engine.state(), GameState::Won);
        assert_eq!(engine.cell_at((0, 0)), CellView::Flagged);
        assert_eq!(engine.flag_count(), 1);
    }

    #[test]
    fn flagging_every_mine_with_exact_count_wins_and_reveals_safe_cells() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);

        for (i, &coords) in BEGINNER_MINES.iter().enumerate() {
            let outcome = engine.toggle_flag(coords).unwrap();
            if i + 1 < BEGINNER_MINES.len() {
                assert_eq!(outcome, FlagOutcome::Changed);
            } else {
                assert_eq!(outcome, FlagOutcome::Won);
            }
        }

        assert_eq!(engine.state(), GameState::Won);
        assert_eq!(engine.revealed_count(), 71);
        for (coords, view) in engine.iter_cells() {
            if BEGINNER_MINES.contains(&coords) {
                assert_eq!(view, CellView::Flagged);
            } else {
                assert!(view.is_revealed());
            }
        }
    }

    #[test]
    fn misplaced_full_flag_count_does_not_win() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);

        for &coords in BEGINNER_MINES.iter().take(9) {
            engine.toggle_flag(coords).unwrap();
        }
        // tenth flag on a safe cell
        assert_eq!(engine.toggle_flag((4, 5)).unwrap(), FlagOutcome::Changed);
        assert_eq!(engine.flag_count(), 10);
        assert!(!engine.state().is_finished());
    }

    #[test]
    fn unflagging_floors_the_counter_at_zero() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);

        engine.toggle_flag((1, 1)).unwrap();
        assert_eq!(engine.flag_count(), 1);
        engine.toggle_flag((1, 1)).unwrap();
        assert_eq!(engine.flag_count(), 0);
        assert_eq!(engine.cell_at((1, 1)), CellView::Hidden);
    }

    #[test]
    fn flag_on_revealed_cell_is_a_no_op() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);
        engine.reveal((4, 5)).unwrap();

        assert_eq!(engine.toggle_flag((4, 5)).unwrap(), FlagOutcome::NoChange);
        assert_eq!(engine.flag_count(), 0);
    }

    #[test]
    fn out_of_bounds_coords_are_rejected() {
        let mut engine = MinefieldEngine::new(GameConfig::beginner(), 7);
        assert_eq!(engine.reveal((9, 0)), Err(GameError::InvalidCoords));
        assert_eq!(engine.toggle_flag((0, 9)), Err(GameError::InvalidCoords));
    }

    #[test]
    fn counters_match_the_board_without_double_counting() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);
        engine.toggle_flag((5, 5)).unwrap();
        engine.reveal((4, 5)).unwrap();
        engine.reveal((0, 2)).unwrap(); // zero cell, flood fills around the flag

        let revealed = engine
            .iter_cells()
            .filter(|(_, view)| view.is_revealed())
            .count();
        let flagged = engine
            .iter_cells()
            .filter(|&(_, view)| view == CellView::Flagged)
            .count();
        assert_eq!(revealed as CellCount, engine.revealed_count());
        assert_eq!(flagged as CellCount, engine.flag_count());
        assert_eq!(engine.cell_at((5, 5)), CellView::Flagged);
    }

    #[test]
    fn hint_points_at_a_covered_unflagged_mine() {
        let mut engine = MinefieldEngine::with_layout(layout((3, 3), &[(0, 0), (2, 2)]), 7);

        let hint = engine.hint().expect("two covered mines available");
        assert!(hint == (0, 0) || hint == (2, 2));

        engine.toggle_flag((0, 0)).unwrap();
        assert_eq!(engine.hint(), Some((2, 2)));
    }

    #[test]
    fn hint_is_unavailable_before_placement_and_after_the_game() {
        let mut engine = MinefieldEngine::new(GameConfig::beginner(), 7);
        assert_eq!(engine.hint(), None);

        let mut finished = MinefieldEngine::with_layout(layout((2, 1), &[(0, 0)]), 7);
        finished.reveal((1, 0)).unwrap();
        assert_eq!(finished.hint(), None);
    }

    #[test]
    fn avoided_layout_is_rerolled() {
        let config = GameConfig::beginner();

        let mut first = MinefieldEngine::new(config, 123);
        first.reveal((4, 4)).unwrap();
        let first_layout = first.mine_layout().unwrap().clone();

        // same seed and start would reproduce the layout exactly, so the
        // re-roll path must kick in
        let mut second = MinefieldEngine::new(config, 123).avoiding(Some(first_layout.clone()));
        second.reveal((4, 4)).unwrap();

        assert_ne!(*second.mine_layout().unwrap(), first_layout);
    }

    #[test]
    fn engine_state_survives_a_serde_round_trip() {
        let mut engine = MinefieldEngine::with_layout(layout((9, 9), &BEGINNER_MINES), 7);
        engine.reveal((4, 5)).unwrap();
        engine.toggle_flag((0, 0)).unwrap();

        let json = serde_json::to_string(&engine).unwrap();
        let restored: MinefieldEngine = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, engine);
    }
}
