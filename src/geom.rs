//! Integer cell geometry shared by layers, selections and the edit log.

use std::collections::BTreeSet;

use macroquad::math::{ivec2, IVec2};

/// Axis-aligned rectangle of map cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileRect {
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in cells.
    pub width: i32,
    /// Height in cells.
    pub height: i32,
}

impl TileRect {
    /// Rectangle from origin and size.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive rectangle spanned by two cells, in any order.
    pub fn from_corners(a: IVec2, b: IVec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::new(min.x, min.y, max.x - min.x + 1, max.y - min.y + 1)
    }

    /// One past the rightmost column.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the bottom row.
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True when the rectangle covers no cell.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of cells covered.
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    /// Whether the cell lies inside the rectangle.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Whether `other` lies entirely inside the rectangle.
    pub fn contains_rect(&self, other: &TileRect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    /// Overlap of both rectangles, `None` when they do not overlap.
    pub fn intersection(&self, other: &TileRect) -> Option<TileRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        (r > x && b > y).then(|| TileRect::new(x, y, r - x, b - y))
    }

    /// Smallest rectangle covering both; empty operands are ignored.
    pub fn union(&self, other: &TileRect) -> TileRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        TileRect::new(x, y, r - x, b - y)
    }

    /// Rectangle moved by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> TileRect {
        TileRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Cells in row-major order (y outer, x inner).
    pub fn cells(&self) -> impl Iterator<Item = IVec2> {
        let r = *self;
        (r.y..r.bottom()).flat_map(move |y| (r.x..r.right()).map(move |x| ivec2(x, y)))
    }
}

/// Arbitrarily shaped set of cells.
///
/// Cells are kept ordered by row then column so iteration is row-major and
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    cells: BTreeSet<(i32, i32)>,
}

impl Region {
    /// Empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Region covering every cell of the rectangle.
    pub fn from_rect(rect: TileRect) -> Self {
        rect.cells().collect()
    }

    /// True when no cell is selected.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the cell belongs to the region.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.cells.contains(&(y, x))
    }

    /// Adds a single cell.
    pub fn insert(&mut self, x: i32, y: i32) -> bool {
        self.cells.insert((y, x))
    }

    /// Removes a single cell.
    pub fn remove(&mut self, x: i32, y: i32) -> bool {
        self.cells.remove(&(y, x))
    }

    /// In-place union.
    pub fn add(&mut self, other: &Region) {
        self.cells.extend(other.cells.iter().copied());
    }

    /// In-place difference.
    pub fn subtract(&mut self, other: &Region) {
        self.cells.retain(|c| !other.cells.contains(c));
    }

    /// In-place intersection.
    pub fn intersect(&mut self, other: &Region) {
        self.cells.retain(|c| other.cells.contains(c));
    }

    /// Replaces the region with its complement inside `within`.
    pub fn invert_within(&mut self, within: TileRect) {
        let inverted = within
            .cells()
            .filter(|c| !self.contains(c.x, c.y))
            .map(|c| (c.y, c.x))
            .collect();
        self.cells = inverted;
    }

    /// Tight bounding rectangle, `None` for an empty region.
    pub fn bounds(&self) -> Option<TileRect> {
        let (first, last) = (self.cells.first()?, self.cells.last()?);
        let (min_x, max_x) = self
            .cells
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), &(_, x)| (lo.min(x), hi.max(x)));
        Some(TileRect::new(
            min_x,
            first.0,
            max_x - min_x + 1,
            last.0 - first.0 + 1,
        ))
    }

    /// Region moved by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        self.iter().map(|c| ivec2(c.x + dx, c.y + dy)).collect()
    }

    /// Cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.cells.iter().map(|&(y, x)| ivec2(x, y))
    }
}

impl FromIterator<IVec2> for Region {
    fn from_iter<I: IntoIterator<Item = IVec2>>(iter: I) -> Self {
        Region {
            cells: iter.into_iter().map(|c| (c.y, c.x)).collect(),
        }
    }
}
