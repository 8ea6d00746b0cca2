//! Geometry primitives
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing coordinates.
///
/// Percent units, dpi conversion and the reduction factor all produce
/// fractional pixel values, so exact float comparison is never appropriate.
pub const EPS: f64 = 1e-6;

/// Whether two coordinate values are equal within [EPS]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPS
}

/// An x,y coordinate pair
#[derive(Serialize, Deserialize, Default, Debug, Copy, Clone, PartialEq)]
pub struct Point {
    /// An x coordinate relative to the top left corner of the host region
    pub x: f64,
    /// A y coordinate relative to the top left corner of the host region
    pub y: f64,
}

impl Point {
    /// Create a new Point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from(raw: (f64, f64)) -> Self {
        let (x, y) = raw;

        Self { x, y }
    }
}

// A Rect converts to its top left corner
impl From<Rect> for Point {
    fn from(r: Rect) -> Self {
        let Rect { x, y, .. } = r;

        Self { x, y }
    }
}

/// A placement rectangle: top left corner + extent, in region coordinates
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Clone, Copy)]
pub struct Rect {
    /// The x-coordinate of the top left corner of this rect
    pub x: f64,
    /// The y-coordinate of the top left corner of this rect
    pub y: f64,
    /// The width of this rect
    pub w: f64,
    /// The height of this rect
    pub h: f64,
}

impl Rect {
    /// Create a new Rect.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect { x, y, w, h }
    }

    /// The area covered by this rect
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// The x-coordinate of the right hand edge of this rect
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// The y-coordinate of the bottom edge of this rect
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// The midpoint of this rectangle
    pub fn midpoint(&self) -> Point {
        Point {
            x: self.x + self.w / 2.0,
            y: self.y + self.h / 2.0,
        }
    }

    /// The ratio of height over width, the form in which aspect constraints
    /// are expressed. Returns 0.0 for a degenerate rect.
    pub fn aspect(&self) -> f64 {
        if self.w < EPS {
            0.0
        } else {
            self.h / self.w
        }
    }

    /// Check whether this Rect contains `other` as a sub-Rect (within [EPS])
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    /// Check whether this Rect overlaps `other` by more than a shared edge
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right() - EPS
            && other.x < self.right() - EPS
            && self.y < other.bottom() - EPS
            && other.y < self.bottom() - EPS
    }

    /// Shrink this rect by `inset` on every side.
    ///
    /// Returns `None` when the inset would consume the rect entirely.
    pub fn inset_by(&self, inset: f64) -> Option<Self> {
        if self.w - 2.0 * inset < EPS || self.h - 2.0 * inset < EPS {
            return None;
        }

        Some(Self {
            x: self.x + inset,
            y: self.y + inset,
            w: self.w - 2.0 * inset,
            h: self.h - 2.0 * inset,
        })
    }

    /// Center this Rect inside of `enclosing`.
    ///
    /// Returns `None` if this Rect can not fit inside enclosing
    pub fn centered_in(&self, enclosing: &Rect) -> Option<Self> {
        if self.w > enclosing.w + EPS || self.h > enclosing.h + EPS {
            return None;
        }

        Some(Self {
            x: enclosing.x + ((enclosing.w - self.w) / 2.0),
            y: enclosing.y + ((enclosing.h - self.h) / 2.0),
            ..*self
        })
    }

    /// Divides this rect into two columns where the first has the given width.
    ///
    /// Returns `None` if new_width is out of bounds
    pub fn split_at_width(&self, new_width: f64) -> Option<(Self, Self)> {
        if new_width >= self.w - EPS || new_width < EPS {
            None
        } else {
            Some((
                Self {
                    w: new_width,
                    ..*self
                },
                Self {
                    x: self.x + new_width,
                    w: self.w - new_width,
                    ..*self
                },
            ))
        }
    }

    /// Divides this rect into two rows where the first has the given height.
    ///
    /// Returns `None` if new_height is out of bounds
    pub fn split_at_height(&self, new_height: f64) -> Option<(Self, Self)> {
        if new_height >= self.h - EPS || new_height < EPS {
            None
        } else {
            Some((
                Self {
                    h: new_height,
                    ..*self
                },
                Self {
                    y: self.y + new_height,
                    h: self.h - new_height,
                    ..*self
                },
            ))
        }
    }

    /// Attempt to merge this rect with `other` into a single rect.
    ///
    /// Merging is only possible when the two share the full length of one edge
    /// and have identical lengths along the orthogonal axis, i.e. when the
    /// union of the two is itself a rectangle.
    pub fn merged(&self, other: &Rect) -> Option<Rect> {
        // side by side, same vertical extent
        if approx_eq(self.y, other.y) && approx_eq(self.h, other.h) {
            if approx_eq(self.right(), other.x) {
                return Some(Rect::new(self.x, self.y, self.w + other.w, self.h));
            }
            if approx_eq(other.right(), self.x) {
                return Some(Rect::new(other.x, self.y, self.w + other.w, self.h));
            }
        }

        // stacked, same horizontal extent
        if approx_eq(self.x, other.x) && approx_eq(self.w, other.w) {
            if approx_eq(self.bottom(), other.y) {
                return Some(Rect::new(self.x, self.y, self.w, self.h + other.h));
            }
            if approx_eq(other.bottom(), self.y) {
                return Some(Rect::new(self.x, other.y, self.w, self.h + other.h));
            }
        }

        None
    }

    /// Round position and size to whole pixels.
    pub fn rounded(&self) -> (i64, i64, i64, i64) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            self.w.round() as i64,
            self.h.round() as i64,
        )
    }
}
