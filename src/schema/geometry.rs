/// Grid geometry — integer vectors, cardinal directions, and a dense 2D container.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("index {index} is out of bounds for a {dim} grid")]
    OutOfBounds { index: Vector2D, dim: Vector2D },
}

/// An immutable integer pair, used both as a grid coordinate (column, row)
/// and as a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: i32,
    pub y: i32,
}

impl Vector2D {
    pub const ZERO: Vector2D = Vector2D { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn length_sq(self) -> i64 {
        i64::from(self.x) * i64::from(self.x) + i64::from(self.y) * i64::from(self.y)
    }

    /// Euclidean length.
    pub fn length(self) -> f64 {
        (self.length_sq() as f64).sqrt()
    }

    pub fn manhattan(self) -> i32 {
        self.x.abs() + self.y.abs()
    }

    pub fn dot_product(self, other: Vector2D) -> i32 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross_product(self, other: Vector2D) -> i32 {
        self.x * other.y - self.y * other.x
    }

    pub fn is_perpendicular_to(self, other: Vector2D) -> bool {
        self.dot_product(other) == 0
    }

    pub fn is_parallel_to(self, other: Vector2D) -> bool {
        self.cross_product(other) == 0
    }

    /// Treat `self` as coordinates in the basis `(mati, matj)`.
    pub fn apply_matrix(self, mati: Vector2D, matj: Vector2D) -> Vector2D {
        mati * self.x + matj * self.y
    }

    /// `v·M + t`: the basis change followed by a translation.
    pub fn affine_transform(self, mati: Vector2D, matj: Vector2D, translation: Vector2D) -> Vector2D {
        self.apply_matrix(mati, matj) + translation
    }

    /// Component-wise addition, `None` when a component overflows.
    pub fn checked_add(self, other: Vector2D) -> Option<Vector2D> {
        Some(Vector2D::new(self.x.checked_add(other.x)?, self.y.checked_add(other.y)?))
    }

    /// [`affine_transform`](Self::affine_transform), `None` when the result
    /// leaves the `i32` range.
    pub fn checked_affine_transform(self, mati: Vector2D, matj: Vector2D, translation: Vector2D) -> Option<Vector2D> {
        let component = |i: i32, j: i32, t: i32| {
            let wide = i128::from(i) * i128::from(self.x) + i128::from(j) * i128::from(self.y) + i128::from(t);
            i32::try_from(wide).ok()
        };
        Some(Vector2D::new(
            component(mati.x, matj.x, translation.x)?,
            component(mati.y, matj.y, translation.y)?,
        ))
    }

    /// Affine transform around `origin` instead of around (0, 0).
    pub fn affine_transform_with_origin(
        self,
        origin: Vector2D,
        mati: Vector2D,
        matj: Vector2D,
        translation: Vector2D,
    ) -> Vector2D {
        (self - origin).affine_transform(mati, matj, translation) + origin
    }
}

impl std::fmt::Display for Vector2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Vector2D {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl Add for Vector2D {
    type Output = Vector2D;

    fn add(self, other: Vector2D) -> Vector2D {
        Vector2D::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vector2D {
    fn add_assign(&mut self, other: Vector2D) {
        *self = *self + other;
    }
}

impl Sub for Vector2D {
    type Output = Vector2D;

    fn sub(self, other: Vector2D) -> Vector2D {
        self + (-other)
    }
}

impl Neg for Vector2D {
    type Output = Vector2D;

    fn neg(self) -> Vector2D {
        Vector2D::new(-self.x, -self.y)
    }
}

impl Mul<i32> for Vector2D {
    type Output = Vector2D;

    fn mul(self, k: i32) -> Vector2D {
        Vector2D::new(self.x * k, self.y * k)
    }
}

/// Screen directions. North is up, so it points toward smaller rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    North,
    East,
    South,
    West,
}

impl Cardinal {
    pub const UP: Cardinal = Cardinal::North;
    pub const RIGHT: Cardinal = Cardinal::East;
    pub const DOWN: Cardinal = Cardinal::South;
    pub const LEFT: Cardinal = Cardinal::West;

    pub fn vector(self) -> Vector2D {
        match self {
            Self::North => Vector2D::new(0, -1),
            Self::East => Vector2D::new(1, 0),
            Self::South => Vector2D::new(0, 1),
            Self::West => Vector2D::new(-1, 0),
        }
    }
}

impl From<Cardinal> for Vector2D {
    fn from(dir: Cardinal) -> Self {
        dir.vector()
    }
}

/// A dense row-major 2D array addressed by `Vector2D`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D<T> {
    dim: Vector2D,
    cells: Vec<T>,
}

impl<T: Clone + Default> Grid2D<T> {
    /// Create a grid of `dim.x` columns and `dim.y` rows filled with defaults.
    /// Negative dimensions are treated as zero.
    pub fn new(dim: Vector2D) -> Self {
        let dim = Vector2D::new(dim.x.max(0), dim.y.max(0));
        let len = dim.x as usize * dim.y as usize;
        Self {
            dim,
            cells: vec![T::default(); len],
        }
    }

    /// Reset every cell to its default.
    pub fn clear(&mut self) {
        self.cells.fill(T::default());
    }
}

impl<T> Grid2D<T> {
    pub fn dim(&self) -> Vector2D {
        self.dim
    }

    pub fn contains(&self, index: Vector2D) -> bool {
        index.x >= 0 && index.y >= 0 && index.x < self.dim.x && index.y < self.dim.y
    }

    fn flatten(&self, index: Vector2D) -> Result<usize, GeometryError> {
        if !self.contains(index) {
            return Err(GeometryError::OutOfBounds {
                index,
                dim: self.dim,
            });
        }
        Ok(index.y as usize * self.dim.x as usize + index.x as usize)
    }

    pub fn get(&self, index: Vector2D) -> Option<&T> {
        let i = self.flatten(index).ok()?;
        self.cells.get(i)
    }

    pub fn set(&mut self, index: Vector2D, value: T) -> Result<(), GeometryError> {
        let i = self.flatten(index)?;
        self.cells[i] = value;
        Ok(())
    }

    pub fn get_mut(&mut self, index: Vector2D) -> Option<&mut T> {
        let i = self.flatten(index).ok()?;
        self.cells.get_mut(i)
    }

    /// Row-major iteration over `(position, cell)`.
    pub fn iter(&self) -> impl Iterator<Item = (Vector2D, &T)> {
        let width = self.dim.x.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, c)| (Vector2D::new(i as i32 % width, i as i32 / width), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Vector2D::new(1, 2);
        let b = Vector2D::new(3, -4);
        assert_eq!(a + b, Vector2D::new(4, -2));
        assert_eq!(a - b, Vector2D::new(-2, 6));
        assert_eq!(a * 3, Vector2D::new(3, 6));
        assert_eq!(-a, Vector2D::new(-1, -2));
    }

    #[test]
    fn products_and_lengths() {
        let a = Vector2D::new(3, 4);
        assert_eq!(a.dot_product(Vector2D::new(1, 0)), 3);
        assert_eq!(a.cross_product(Vector2D::new(1, 0)), -4);
        assert_eq!(a.manhattan(), 7);
        assert!((a.length() - 5.0).abs() < f64::EPSILON);
        assert!(Cardinal::East.vector().is_perpendicular_to(Cardinal::North.vector()));
        assert!(Vector2D::new(2, 4).is_parallel_to(Vector2D::new(1, 2)));
    }

    #[test]
    fn affine_transform_flips_axes() {
        // columns grow downward, rows grow leftward
        let p = Vector2D::new(2, 1).affine_transform(
            Vector2D::new(0, 1),
            Vector2D::new(-1, 0),
            Vector2D::new(10, 5),
        );
        assert_eq!(p, Vector2D::new(9, 7));
    }

    #[test]
    fn checked_operations_report_overflow() {
        let edge = Vector2D::new(i32::MAX, 0);
        assert_eq!(edge.checked_add(Vector2D::new(0, 1)), Some(Vector2D::new(i32::MAX, 1)));
        assert_eq!(edge.checked_add(Vector2D::new(1, 0)), None);

        let (south, west) = (Cardinal::South.vector(), Cardinal::West.vector());
        let p = Vector2D::new(2, 1).checked_affine_transform(Vector2D::new(0, 1), Vector2D::new(-1, 0), Vector2D::new(10, 5));
        assert_eq!(p, Some(Vector2D::new(9, 7)));
        assert_eq!(edge.checked_affine_transform(south, west, Vector2D::new(0, 1)), None);
    }

    #[test]
    fn affine_transform_with_origin_keeps_origin_fixed() {
        let origin = Vector2D::new(3, 3);
        let p = origin.affine_transform_with_origin(
            origin,
            Vector2D::new(0, 1),
            Vector2D::new(1, 0),
            Vector2D::ZERO,
        );
        assert_eq!(p, origin);
    }

    #[test]
    fn grid_row_major_addressing() {
        let mut g: Grid2D<u8> = Grid2D::new(Vector2D::new(3, 2));
        g.set(Vector2D::new(2, 1), 7).unwrap();
        assert_eq!(g.get(Vector2D::new(2, 1)), Some(&7));
        let (pos, _) = g.iter().find(|(_, v)| **v == 7).unwrap();
        assert_eq!(pos, Vector2D::new(2, 1));
    }

    #[test]
    fn grid_out_of_bounds() {
        let mut g: Grid2D<u8> = Grid2D::new(Vector2D::new(3, 2));
        assert!(g.get(Vector2D::new(3, 0)).is_none());
        assert!(g.get(Vector2D::new(-1, 0)).is_none());
        assert_eq!(
            g.set(Vector2D::new(0, 2), 1),
            Err(GeometryError::OutOfBounds {
                index: Vector2D::new(0, 2),
                dim: Vector2D::new(3, 2)
            })
        );
    }
}
