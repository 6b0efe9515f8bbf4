use serde::{Deserialize, Serialize};

/// ChESS corner detector settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseParams {
    /// Candidates must exceed this fraction of the strongest response.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: usize,
}

impl Default for ResponseParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

/// Histogram clustering of edge directions into the two grid axes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxisClusteringParams {
    /// Number of histogram bins on [0, π).
    pub num_bins: usize,
    /// Nearest neighbours per candidate that vote for an axis.
    pub votes_per_corner: usize,
    /// Minimal separation between the two axes (degrees).
    pub min_separation_deg: f64,
    /// Votes farther than this from both axes are ignored (degrees).
    pub outlier_threshold_deg: f64,
    pub max_iters: usize,
}

impl Default for AxisClusteringParams {
    fn default() -> Self {
        Self {
            num_bins: 36,
            votes_per_corner: 4,
            min_separation_deg: 30.0,
            outlier_threshold_deg: 25.0,
            max_iters: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f64,
    pub max_spacing_pix: f64,
    pub k_neighbors: usize,
    /// Maximal angle between an edge and its grid axis (degrees).
    pub orientation_tolerance_deg: f64,
    /// Edges longer than this multiple of the candidate's nearest-neighbour
    /// distance are rejected.
    pub max_length_ratio: f64,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 400.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
            max_length_ratio: 1.6,
        }
    }
}

/// Gradient-orthogonality corner refinement.
///
/// Defaults mirror the usual `(11, 11)` window with a 30 iteration /
/// 0.001 px stopping rule.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    pub half_window: usize,
    pub max_iterations: usize,
    pub epsilon: f64,
    /// Shrink the window to stay within ~45% of the local corner spacing.
    pub clamp_to_spacing: bool,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iterations: 30,
            epsilon: 0.001,
            clamp_to_spacing: true,
        }
    }
}

/// Parameters of the chessboard detector.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardDetectorParams {
    pub response: ResponseParams,
    pub axes: AxisClusteringParams,
    pub graph: GridGraphParams,
    pub subpix: SubPixParams,
}
