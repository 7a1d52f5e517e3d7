//! # Ray rasterisation
//!
//! Integer Bresenham line walking between two cells. Works on signed cell indices so that rays
//! may start or end outside the grid, the caller decides what to do with those cells.

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Signed index of a grid cell. May lie outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex {
    pub row: i64,
    pub col: i64,
}

/// Iterator over the cells of a Bresenham line, both ends included.
#[derive(Debug, Clone)]
pub struct CellLine {
    current: CellIndex,
    end: CellIndex,

    d_col: i64,
    d_row: i64,
    step_col: i64,
    step_row: i64,
    error: i64,

    done: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CellIndex {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

impl CellLine {
    pub fn new(start: CellIndex, end: CellIndex) -> Self {
        let d_col = (end.col - start.col).abs();
        let d_row = -(end.row - start.row).abs();

        Self {
            current: start,
            end,
            d_col,
            d_row,
            step_col: if start.col < end.col { 1 } else { -1 },
            step_row: if start.row < end.row { 1 } else { -1 },
            error: d_col + d_row,
            done: false,
        }
    }

    /// Number of cells the line will visit in total.
    pub fn cell_count(&self) -> usize {
        self.d_col.max(-self.d_row) as usize + 1
    }
}

impl Iterator for CellLine {
    type Item = CellIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let cell = self.current;

        if cell == self.end {
            self.done = true;
            return Some(cell);
        }

        let e2 = 2 * self.error;
        if e2 >= self.d_row {
            self.error += self.d_row;
            self.current.col += self.step_col;
        }
        if e2 <= self.d_col {
            self.error += self.d_col;
            self.current.row += self.step_row;
        }

        Some(cell)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
