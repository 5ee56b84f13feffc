//! Region finder: turns a colour-coded layout image into an open/blocked mask and the
//! contiguous same-colour regions rules attach to.
//!
//! Pure black pixels are blocked; every other colour is open space. Each image pixel maps to
//! one grid point, image row `y` to grid row `y`.

use crate::error::{SimError, SimResult};
use image::{Rgb, RgbImage};
use log::{debug, info};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

/// Colour that marks blocked (non-simulated) points.
pub const BLOCKED_COLOR: [u8; 3] = [0, 0, 0];
/// Colour of the implicit region of an open domain built without an image.
pub const OPEN_COLOR: [u8; 3] = [255, 255, 255];

/// A maximal 4-connected set of open points sharing one layout colour. Immutable once found.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: usize,
    pub color: [u8; 3],
    /// Grid indices, in row-major order.
    pub points: Arc<[usize]>,
}

impl Region {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Parsed layout: domain size, open mask and regions.
#[derive(Debug, Clone)]
pub struct Layout {
    pub width: usize,
    pub height: usize,
    pub open: Vec<bool>,
    pub regions: Vec<Region>,
}

impl Layout {
    /// Fully open `width` x `height` domain forming a single region.
    pub fn open(width: usize, height: usize) -> Self {
        let points: Arc<[usize]> = (0..width * height).collect();
        Self {
            width,
            height,
            open: vec![true; width * height],
            regions: vec![Region { id: 0, color: OPEN_COLOR, points }],
        }
    }

    /// Reads and parses a layout image. Any failure is an initialization error.
    pub fn from_image_path(path: &Path) -> SimResult<Self> {
        let image = image::open(path).map_err(|e| {
            SimError::Initialization(format!("cannot read layout image '{}': {}", path.display(), e))
        })?;
        let layout = Self::from_image(&image.to_rgb8())?;
        info!(
            "Layout '{}': {}x{} points, {} regions.",
            path.display(),
            layout.width,
            layout.height,
            layout.regions.len()
        );
        Ok(layout)
    }

    /// Parses an in-memory RGB image.
    pub fn from_image(image: &RgbImage) -> SimResult<Self> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if width < 3 || height < 3 {
            return Err(SimError::Initialization(format!(
                "layout image is {}x{}, at least 3x3 pixels are required",
                width, height
            )));
        }

        let colors: Vec<[u8; 3]> = image.pixels().map(|Rgb(c)| *c).collect();
        let open: Vec<bool> = colors.iter().map(|c| *c != BLOCKED_COLOR).collect();
        if !open.iter().any(|&o| o) {
            return Err(SimError::Initialization("layout image has no open pixels".to_string()));
        }

        let regions = find_regions(width, height, &colors, &open);
        debug!("Found {} regions in {}x{} layout.", regions.len(), width, height);
        Ok(Self { width, height, open, regions })
    }

    /// Regions painted in `color`.
    pub fn regions_with_color(&self, color: [u8; 3]) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.color == color)
    }
}

/// Flood-fills 4-connected runs of identical colour over the open pixels.
fn find_regions(width: usize, height: usize, colors: &[[u8; 3]], open: &[bool]) -> Vec<Region> {
    let mut visited = vec![false; width * height];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..width * height {
        if visited[start] || !open[start] {
            continue;
        }
        let color = colors[start];
        let mut points = Vec::new();
        visited[start] = true;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            points.push(idx);
            let (x, y) = (idx % width, idx / width);
            let candidates = [
                (x > 0).then(|| idx - 1),
                (x + 1 < width).then(|| idx + 1),
                (y > 0).then(|| idx - width),
                (y + 1 < height).then(|| idx + width),
            ];
            for next in candidates.into_iter().flatten() {
                if !visited[next] && open[next] && colors[next] == color {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        points.sort_unstable();
        regions.push(Region { id: regions.len(), color, points: points.into() });
    }
    regions
}
