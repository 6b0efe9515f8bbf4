use camcal_core::GrayImageView;
use nalgebra::Point2;

use crate::corners::detect_candidates;
use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::grid_transform::canonicalize;
use crate::params::ChessboardDetectorParams;
use crate::spec::ChessboardSpec;
use crate::subpix::refine_corners;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of looking for the board in one image.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    /// All `cols × rows` inner corners in pixels, row-major
    /// (index `y * cols + x`), matching [`ChessboardSpec::object_points`].
    Found(Vec<Point2<f64>>),
    NotFound,
}

impl DetectionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, DetectionOutcome::Found(_))
    }

    pub fn corners(&self) -> Option<&[Point2<f64>]> {
        match self {
            DetectionOutcome::Found(c) => Some(c),
            DetectionOutcome::NotFound => None,
        }
    }

    pub fn into_corners(self) -> Option<Vec<Point2<f64>>> {
        match self {
            DetectionOutcome::Found(c) => Some(c),
            DetectionOutcome::NotFound => None,
        }
    }
}

/// Chessboard inner-corner detector.
///
/// Detection never fails loudly: anything short of a complete, consistently
/// ordered `cols × rows` grid is reported as [`DetectionOutcome::NotFound`].
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    spec: ChessboardSpec,
    params: ChessboardDetectorParams,
}

impl ChessboardDetector {
    pub fn new(spec: ChessboardSpec, params: ChessboardDetectorParams) -> Self {
        Self { spec, params }
    }

    pub fn spec(&self) -> &ChessboardSpec {
        &self.spec
    }

    pub fn params(&self) -> &ChessboardDetectorParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = img.width, height = img.height))
    )]
    pub fn detect(&self, img: &GrayImageView<'_>) -> DetectionOutcome {
        match self.detect_grid(img) {
            Some(corners) => DetectionOutcome::Found(corners),
            None => DetectionOutcome::NotFound,
        }
    }

    fn detect_grid(&self, img: &GrayImageView<'_>) -> Option<Vec<Point2<f64>>> {
        let (cols, rows) = self.spec.inner_corners();
        let expected = cols * rows;
        if img.width == 0 || img.height == 0 || img.data.len() != img.width * img.height {
            log::debug!("invalid image buffer {}x{}", img.width, img.height);
            return None;
        }

        let candidates = detect_candidates(img, &self.params.response);
        if candidates.len() < expected {
            log::debug!("{} candidates, need {}", candidates.len(), expected);
            return None;
        }
        let positions: Vec<Point2<f64>> = candidates.iter().map(|c| c.position).collect();

        let graph = GridGraph::build(&positions, &self.params.graph, &self.params.axes)?;
        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));
        log::debug!(
            "largest grid components: {:?}",
            components.iter().take(3).map(Vec::len).collect::<Vec<_>>()
        );

        let (u, v) = (graph.axes.unit(0), graph.axes.unit(1));
        for component in components.iter().filter(|c| c.len() == expected) {
            let Some(coords) = assign_grid_coordinates(&graph, component) else {
                log::debug!("grid coordinate collision, component rejected");
                continue;
            };
            let Some(cells) = canonicalize(&coords, u, v, cols, rows) else {
                continue;
            };

            let mut corners = vec![Point2::origin(); expected];
            for &(node, x, y) in &cells {
                corners[y * cols + x] = positions[node];
            }

            let mut spacings: Vec<f64> = component
                .iter()
                .flat_map(|&n| graph.neighbors[n].iter().map(|l| l.distance))
                .collect();
            spacings.sort_by(f64::total_cmp);
            let spacing = spacings.get(spacings.len() / 2).copied();

            refine_corners(img, &mut corners, spacing, &self.params.subpix);
            if corners.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
                return Some(corners);
            }
        }
        None
    }
}
