//! Canonical orientation of an assembled corner grid.
//!
//! BFS coordinates come with an arbitrary axis assignment. Of the eight
//! symmetries of the square grid we keep those that make the grid exactly
//! `cols × rows`, right-handed in image coordinates (`+i` to `+j` turns the
//! same way as `+x` to `+y`), and pick the one whose `+i` axis points most
//! towards image `+x`.

use nalgebra::Vector2;

/// Integer 2D grid transform: `(i', j') = (a*i + b*j, c*i + d*j)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridTransform {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl GridTransform {
    pub const IDENTITY: GridTransform = GridTransform {
        a: 1,
        b: 0,
        c: 0,
        d: 1,
    };

    #[inline]
    pub fn apply(&self, i: i32, j: i32) -> [i32; 2] {
        [self.a * i + self.b * j, self.c * i + self.d * j]
    }

    pub fn det(&self) -> i32 {
        self.a * self.d - self.b * self.c
    }

    /// Invert the transform if it is unimodular (det = ±1).
    pub fn inverse(&self) -> Option<GridTransform> {
        let det = self.det();
        if det != 1 && det != -1 {
            return None;
        }
        Some(GridTransform {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
        })
    }

    fn swaps_axes(&self) -> bool {
        self.a == 0
    }
}

/// The 8 dihedral transforms `D4` on the integer grid.
pub const GRID_TRANSFORMS_D4: [GridTransform; 8] = [
    // rotations: 0°, 90°, 180°, 270°
    GridTransform {
        a: 1,
        b: 0,
        c: 0,
        d: 1,
    },
    GridTransform {
        a: 0,
        b: 1,
        c: -1,
        d: 0,
    },
    GridTransform {
        a: -1,
        b: 0,
        c: 0,
        d: -1,
    },
    GridTransform {
        a: 0,
        b: -1,
        c: 1,
        d: 0,
    },
    // reflections
    GridTransform {
        a: -1,
        b: 0,
        c: 0,
        d: 1,
    },
    GridTransform {
        a: 1,
        b: 0,
        c: 0,
        d: -1,
    },
    GridTransform {
        a: 0,
        b: 1,
        c: 1,
        d: 0,
    },
    GridTransform {
        a: 0,
        b: -1,
        c: -1,
        d: 0,
    },
];

/// Map BFS coordinates `(node, i, j)` (normalised to start at 0) onto the
/// canonical `cols × rows` frame.
///
/// `u` and `v` are the image directions of `+i` and `+j`. Returns
/// `(node, x, y)` with `0 <= x < cols`, `0 <= y < rows`, or `None` if the
/// grid does not have the expected extent.
pub fn canonicalize(
    coords: &[(usize, i32, i32)],
    u: Vector2<f64>,
    v: Vector2<f64>,
    cols: usize,
    rows: usize,
) -> Option<Vec<(usize, usize, usize)>> {
    let w = coords.iter().map(|c| c.1).max()? + 1;
    let h = coords.iter().map(|c| c.2).max()? + 1;
    let handedness = u.perp(&v);
    if handedness == 0.0 {
        return None;
    }

    let mut best: Option<(GridTransform, f64, f64)> = None;
    for t in GRID_TRANSFORMS_D4 {
        let (tw, th) = if t.swaps_axes() { (h, w) } else { (w, h) };
        if tw as usize != cols || th as usize != rows {
            continue;
        }
        let inv = t.inverse()?;
        if inv.det() as f64 * handedness <= 0.0 {
            continue;
        }
        let u_new = (u * inv.a as f64 + v * inv.c as f64).normalize();
        let v_new = (u * inv.b as f64 + v * inv.d as f64).normalize();
        let better = match best {
            None => true,
            Some((_, bx, by)) => u_new.x > bx + 1e-9 || ((u_new.x - bx).abs() <= 1e-9 && v_new.y > by),
        };
        if better {
            best = Some((t, u_new.x, v_new.y));
        }
    }

    let (t, _, _) = best?;
    let mapped: Vec<[i32; 2]> = coords.iter().map(|&(_, i, j)| t.apply(i, j)).collect();
    let min_x = mapped.iter().map(|m| m[0]).min()?;
    let min_y = mapped.iter().map(|m| m[1]).min()?;
    Some(
        coords
            .iter()
            .zip(mapped)
            .map(|(&(n, _, _), [x, y])| (n, (x - min_x) as usize, (y - min_y) as usize))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: i32, h: i32) -> Vec<(usize, i32, i32)> {
        (0..h)
            .flat_map(|j| (0..w).map(move |i| (i as usize + (j * w) as usize, i, j)))
            .collect()
    }

    #[test]
    fn d4_is_closed_under_inverse() {
        for t in GRID_TRANSFORMS_D4 {
            let inv = t.inverse().expect("unimodular");
            assert!(GRID_TRANSFORMS_D4.contains(&inv));
            let [x, y] = t.apply(3, -2);
            assert_eq!(inv.apply(x, y), [3, -2]);
        }
    }

    #[test]
    fn identity_kept_for_upright_grid() {
        let coords = grid(4, 3);
        let out = canonicalize(&coords, Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0), 4, 3)
            .expect("fits");
        for (&(n, i, j), &(m, x, y)) in coords.iter().zip(&out) {
            assert_eq!(n, m);
            assert_eq!((i as usize, j as usize), (x, y));
        }
    }

    #[test]
    fn flipped_axes_are_reoriented() {
        // +i points left and +j points up: a 180° rotation restores the frame.
        let coords = grid(4, 3);
        let out = canonicalize(&coords, Vector2::new(-1.0, 0.0), Vector2::new(0.0, -1.0), 4, 3)
            .expect("fits");
        assert_eq!(out[0], (0, 3, 2));
        assert_eq!(out[11], (11, 0, 0));
    }

    #[test]
    fn mirrored_frame_is_made_right_handed() {
        // +i points down, +j points right (left-handed in image coords).
        let coords = grid(3, 4);
        let out = canonicalize(&coords, Vector2::new(0.0, 1.0), Vector2::new(1.0, 0.0), 4, 3)
            .expect("fits");
        // Node at (i, j) sits at image position (j, i); canonical x must grow with image x.
        for (&(_, i, j), &(_, x, y)) in coords.iter().zip(&out) {
            assert_eq!((x, y), (j as usize, i as usize));
        }
    }

    #[test]
    fn wrong_extent_is_rejected() {
        let coords = grid(4, 3);
        assert!(canonicalize(&coords, Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0), 5, 3).is_none());
    }
}
