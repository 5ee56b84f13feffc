use chemotaxis_common::Vec2;

/// Shape of the uniform rectangular grid and the micron <-> point conversions.
///
/// Grid point `(x, y)` sits at `(x * dx, y * dx)` microns; row `y` is stored contiguously.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
    pub dx: f32,
}

impl GridGeometry {
    pub fn new(width: usize, height: usize, dx: f32) -> Self {
        Self { width, height, dx }
    }

    /// Total number of grid points.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline(always)]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    /// Index of `(x, y)` if it lies on the grid.
    #[inline(always)]
    pub fn checked_index(&self, x: i64, y: i64) -> Option<usize> {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            Some(self.index(x as usize, y as usize))
        } else {
            None
        }
    }

    /// Nearest grid point to a micron position, `None` outside the grid.
    #[inline(always)]
    pub fn nearest_point(&self, pos: Vec2) -> Option<usize> {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return None;
        }
        let gx = (pos.x / self.dx).round();
        let gy = (pos.y / self.dx).round();
        self.checked_index(gx as i64, gy as i64)
    }

    /// Micron position of a grid point.
    #[inline(always)]
    pub fn point_position(&self, idx: usize) -> Vec2 {
        let (x, y) = self.coords(idx);
        Vec2::new(x as f32 * self.dx, y as f32 * self.dx)
    }

    /// West, east, north and south neighbours (in that order), `None` past the grid edge.
    #[inline(always)]
    pub fn neighbors(&self, idx: usize) -> [Option<usize>; 4] {
        let (x, y) = self.coords(idx);
        [
            (x > 0).then(|| idx - 1),
            (x + 1 < self.width).then(|| idx + 1),
            (y > 0).then(|| idx - self.width),
            (y + 1 < self.height).then(|| idx + self.width),
        ]
    }

    /// Calls `f` for every grid point within `radius` microns (inclusive) of `center`.
    pub fn for_each_point_within<F>(&self, center: Vec2, radius: f32, mut f: F)
    where
        F: FnMut(usize),
    {
        if self.is_empty() || !(radius >= 0.0) {
            return;
        }
        let inv_dx = 1.0 / self.dx;
        let radius_sq = radius * radius;

        let x_min = ((center.x - radius) * inv_dx).floor().max(0.0) as i64;
        let y_min = ((center.y - radius) * inv_dx).floor().max(0.0) as i64;
        let x_max = (((center.x + radius) * inv_dx).ceil() as i64).min(self.width as i64 - 1);
        let y_max = (((center.y + radius) * inv_dx).ceil() as i64).min(self.height as i64 - 1);

        for gy in y_min..=y_max {
            for gx in x_min..=x_max {
                let idx = self.index(gx as usize, gy as usize);
                if self.point_position(idx).distance_squared(center) <= radius_sq {
                    f(idx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_point_rounds_and_rejects_outside() {
        let grid = GridGeometry::new(10, 5, 4.0);
        assert_eq!(grid.nearest_point(Vec2::new(5.9, 0.0)), Some(1));
        assert_eq!(grid.nearest_point(Vec2::new(8.0, 4.1)), Some(grid.index(2, 1)));
        assert_eq!(grid.nearest_point(Vec2::new(-2.5, 0.0)), None);
        assert_eq!(grid.nearest_point(Vec2::new(0.0, 18.1)), None);
    }

    #[test]
    fn neighbors_stop_at_edges() {
        let grid = GridGeometry::new(3, 3, 1.0);
        assert_eq!(grid.neighbors(0), [None, Some(1), None, Some(3)]);
        assert_eq!(grid.neighbors(4), [Some(3), Some(5), Some(1), Some(7)]);
    }

    #[test]
    fn points_within_radius_form_a_disc() {
        let grid = GridGeometry::new(11, 11, 1.0);
        let mut count = 0;
        grid.for_each_point_within(Vec2::new(5.0, 5.0), 1.0, |_| count += 1);
        assert_eq!(count, 5);
        count = 0;
        grid.for_each_point_within(Vec2::new(0.0, 0.0), 1.5, |_| count += 1);
        assert_eq!(count, 4);
    }
}
