use super::*;

/// Seeded uniform generation. Reserves cells around the start position
/// according to the [`StartCell`] policy, then draws each mine as the nth
/// free cell of the flat mask, so placement always terminates.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomMinefieldGenerator {
    seed: u64,
    start: Coord2,
    start_cell: StartCell,
}

impl RandomMinefieldGenerator {
    pub fn new(seed: u64, start: Coord2, start_cell: StartCell) -> Self {
        Self {
            seed,
            start,
            start_cell,
        }
    }
}

impl MinefieldGenerator for RandomMinefieldGenerator {
    fn generate(self, config: GameConfig) -> MineLayout {
        use rand::prelude::*;
        use StartCell::*;

        let total_cells = config.total_cells();

        // optimize for full boards
        if config.mines >= total_cells {
            if config.mines > total_cells {
                log::warn!(
                    "Minefield already full, generated anyway, requested {} but only fits {}",
                    config.mines,
                    total_cells
                );
            }
            return MineLayout::from_mine_mask(ndarray::Array2::from_elem(
                config.size.to_nd_index(),
                true,
            ));
        }

        // in-bounds cells a zero start would reserve (corners reserve fewer than 9)
        let zero_reserved =
            1 + NeighborIter::new(self.start, config.size).count() as CellCount;
        let actual_start_cell = match self.start_cell {
            Random => Random,
            SimpleSafe | AlwaysZero if config.mines + 1 > total_cells => {
                log::warn!("Cannot make start cell safe, fallback to random");
                Random
            }
            SimpleSafe => SimpleSafe,
            AlwaysZero if config.mines + zero_reserved > total_cells => {
                log::warn!("Cannot make start cell zero, fallback to simple safe");
                SimpleSafe
            }
            AlwaysZero => AlwaysZero,
        };

        // reserve the excluded cells by pre-marking them
        let mut mine_mask: ndarray::Array2<bool> = ndarray::Array2::default(config.size.to_nd_index());
        let mut reserved: CellCount = 0;
        match actual_start_cell {
            Random => {}
            SimpleSafe => {
                mine_mask[self.start.to_nd_index()] = true;
                reserved = 1;
            }
            AlwaysZero => {
                mine_mask[self.start.to_nd_index()] = true;
                reserved = 1;
                for coord in NeighborIter::new(self.start, config.size) {
                    mine_mask[coord.to_nd_index()] = true;
                    reserved += 1;
                }
            }
        }
        let mut free_cells = total_cells - reserved;
        let mut mines_placed = 0;

        let mut rng = SmallRng::seed_from_u64(self.seed);
        {
            let cells = mine_mask.as_slice_mut().expect("layout should be standard");
            while mines_placed < config.mines {
                if free_cells == 0 {
                    break;
                }
                let mut place: CellCount = rng.random_range(0..free_cells);
                for (i, cell) in cells.iter_mut().enumerate() {
                    let i = i as CellCount;
                    if *cell {
                        place += 1;
                    }
                    if i == place {
                        *cell = true;
                        mines_placed += 1;
                        free_cells -= 1;
                        break;
                    }
                }
            }
        }

        // undo the reservation to leave the excluded cells safe
        match actual_start_cell {
            Random => {}
            SimpleSafe => {
                mine_mask[self.start.to_nd_index()] = false;
            }
            AlwaysZero => {
                mine_mask[self.start.to_nd_index()] = false;
                for coord in NeighborIter::new(self.start, config.size) {
                    mine_mask[coord.to_nd_index()] = false;
                }
            }
        }

        let layout = MineLayout::from_mine_mask(mine_mask);
        if layout.mine_count() != config.mines {
            log::warn!(
                "Generated minefield count mismatch, actual: {}, requested: {}",
                layout.mine_count(),
                config.mines
            );
        }
        layout
    }
}
