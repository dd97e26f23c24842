/// In-memory screen — a grid of styled cells that playback paints into.

use parking_lot::Mutex;

use crate::core::playback::GridDisplay;
use crate::schema::cell::ScreenCell;
use crate::schema::geometry::{Grid2D, Vector2D};
use crate::schema::value::StyleMap;

/// A fixed-size grid of optional cells. `None` is a blank cell.
///
/// Interior mutability lets concurrent playback flows share one screen.
#[derive(Debug)]
pub struct GameScreen {
    grid: Mutex<Grid2D<Option<ScreenCell>>>,
}

fn corners(from: Vector2D, to: Vector2D) -> (Vector2D, Vector2D) {
    (
        Vector2D::new(from.x.min(to.x), from.y.min(to.y)),
        Vector2D::new(from.x.max(to.x), from.y.max(to.y)),
    )
}

impl GameScreen {
    /// `dim` is columns by rows.
    pub fn new(dim: Vector2D) -> Self {
        Self {
            grid: Mutex::new(Grid2D::new(dim)),
        }
    }

    pub fn dim(&self) -> Vector2D {
        self.grid.lock().dim()
    }

    pub fn cell(&self, pos: Vector2D) -> Option<ScreenCell> {
        self.grid.lock().get(pos).cloned().flatten()
    }

    /// Apply `style` over the inclusive rectangle spanned by two corners.
    pub fn paint_rectangle(&self, from: Vector2D, to: Vector2D, style: &StyleMap) {
        let (lo, hi) = corners(from, to);
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                self.paint_cell(Vector2D::new(x, y), style);
            }
        }
    }

    pub fn clear_screen(&self) {
        self.grid.lock().clear();
    }

    /// One row as plain text, blanks as spaces.
    pub fn row_text(&self, y: i32) -> String {
        let grid = self.grid.lock();
        (0..grid.dim().x)
            .map(|x| match grid.get(Vector2D::new(x, y)) {
                Some(Some(cell)) => cell.display_char(),
                _ => ' ',
            })
            .collect()
    }

    /// The whole screen as plain text, one line per row, trailing blanks trimmed.
    pub fn dump(&self) -> String {
        let rows = self.dim().y;
        (0..rows)
            .map(|y| self.row_text(y).trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl GridDisplay for GameScreen {
    fn print_cell(&self, pos: Vector2D, cell: Option<ScreenCell>) {
        if let Err(e) = self.grid.lock().set(pos, cell) {
            tracing::debug!(error = %e, "cell outside the screen");
        }
    }

    fn paint_cell(&self, pos: Vector2D, style: &StyleMap) {
        let mut grid = self.grid.lock();
        match grid.get_mut(pos) {
            Some(slot) => slot.get_or_insert_with(ScreenCell::default).apply_style(style),
            None => tracing::debug!(%pos, "paint outside the screen"),
        }
    }

    fn clear_rectangle(&self, from: Vector2D, to: Vector2D) {
        let (lo, hi) = corners(from, to);
        let mut grid = self.grid.lock();
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                if let Some(slot) = grid.get_mut(Vector2D::new(x, y)) {
                    *slot = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    #[test]
    fn print_and_dump() {
        let screen = GameScreen::new(Vector2D::new(4, 2));
        screen.print_cell(Vector2D::new(0, 0), Some(ScreenCell::from_char('h')));
        screen.print_cell(Vector2D::new(1, 0), Some(ScreenCell::from_char('i')));
        screen.print_cell(Vector2D::new(3, 1), Some(ScreenCell::from_char('!')));
        assert_eq!(screen.dump(), "hi\n   !");
        assert_eq!(screen.row_text(0), "hi  ");
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let screen = GameScreen::new(Vector2D::new(2, 2));
        screen.print_cell(Vector2D::new(5, 5), Some(ScreenCell::from_char('x')));
        assert_eq!(screen.dump(), "\n");
    }

    #[test]
    fn paint_styles_blank_and_printed_cells() {
        let screen = GameScreen::new(Vector2D::new(3, 1));
        screen.print_cell(Vector2D::new(0, 0), Some(ScreenCell::from_char('a')));
        let mut style = StyleMap::default();
        style.insert("bg".into(), Value::from("blue"));
        screen.paint_rectangle(Vector2D::new(1, 0), Vector2D::new(0, 0), &style);

        let a = screen.cell(Vector2D::new(0, 0)).unwrap();
        assert_eq!((a.ch, a.bg.as_str()), (Some('a'), "blue"));
        let blank = screen.cell(Vector2D::new(1, 0)).unwrap();
        assert_eq!((blank.ch, blank.bg.as_str()), (None, "blue"));
        assert!(screen.cell(Vector2D::new(2, 0)).is_none());
    }

    #[test]
    fn clear_rectangle_is_inclusive() {
        let screen = GameScreen::new(Vector2D::new(3, 3));
        for pos in [(0, 0), (1, 1), (2, 2)] {
            screen.print_cell(pos.into(), Some(ScreenCell::from_char('x')));
        }
        screen.clear_rectangle(Vector2D::new(1, 1), Vector2D::new(0, 0));
        assert_eq!(screen.dump(), "\n\n  x");
        screen.clear_screen();
        assert!(screen.cell(Vector2D::new(2, 2)).is_none());
    }
}
