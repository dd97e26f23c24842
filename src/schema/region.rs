use serde::{Deserialize, Serialize};

use super::geometry::{Cardinal, Vector2D};

/// A rectangular area of the display into which a sentence renders.
///
/// Local output is laid out in (column, row) coordinates and mapped to the
/// screen through `row_grow` (the direction a row grows as columns advance)
/// and `col_grow` (the direction a column grows as rows advance), so a
/// region may be flipped or rotated relative to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    /// Columns, rows.
    pub size: Vector2D,
    #[serde(default)]
    pub origin: Vector2D,
    #[serde(default = "default_row_grow")]
    pub row_grow: Vector2D,
    #[serde(default = "default_col_grow")]
    pub col_grow: Vector2D,
}

fn default_row_grow() -> Vector2D {
    Cardinal::East.vector()
}

fn default_col_grow() -> Vector2D {
    Cardinal::South.vector()
}

impl ScreenRegion {
    pub fn new(size: Vector2D, origin: Vector2D) -> Self {
        Self {
            size,
            origin,
            row_grow: default_row_grow(),
            col_grow: default_col_grow(),
        }
    }

    #[must_use]
    pub fn with_growth(mut self, row_grow: Vector2D, col_grow: Vector2D) -> Self {
        self.row_grow = row_grow;
        self.col_grow = col_grow;
        self
    }

    /// Map a local (column, row) into screen coordinates.
    pub fn to_screen(&self, local: Vector2D) -> Vector2D {
        local.affine_transform(self.row_grow, self.col_grow, self.origin)
    }

    pub fn is_axis_aligned(&self) -> bool {
        self.row_grow == default_row_grow() && self.col_grow == default_col_grow()
    }

    /// Every screen cell covered by the region, row by row.
    pub fn cells(&self) -> impl Iterator<Item = Vector2D> + '_ {
        (0..self.size.y.max(0))
            .flat_map(move |y| (0..self.size.x.max(0)).map(move |x| self.to_screen(Vector2D::new(x, y))))
    }
}
