//! Chessboard inner-corner detection for camera calibration.
//!
//! Pipeline per image:
//!
//! 1. ChESS X-junction candidates from `chess-corners`,
//! 2. two dominant grid axes from nearest-neighbour edge directions,
//! 3. a 4-connected graph of mutual `±u` / `±v` neighbours,
//! 4. BFS grid coordinates, canonically oriented to the board's
//!    `cols × rows` frame,
//! 5. iterative gradient-orthogonality sub-pixel refinement.
//!
//! [`accumulate`] runs the detector over a calibration set and pairs each
//! detection with the board's object points.
//!
//! ```no_run
//! use camcal_chessboard::{accumulate, ChessboardDetector, ChessboardDetectorParams, ChessboardSpec};
//! use camcal_core::GrayImage;
//!
//! # fn load() -> Vec<GrayImage> { Vec::new() }
//! let spec = ChessboardSpec::new(9, 6)?.with_square_size(0.025)?;
//! let detector = ChessboardDetector::new(spec, ChessboardDetectorParams::default());
//! let images = load();
//! let set = accumulate(images.iter().map(|i| i.view()), &detector);
//! println!("{} usable views, skipped {:?}", set.len(), set.skipped);
//! # Ok::<(), camcal_chessboard::ChessboardSpecError>(())
//! ```

mod axes;
mod correspondence;
mod corners;
mod detector;
mod grid_transform;
mod gridgraph;
mod params;
mod spec;
mod subpix;
pub mod synthetic;

pub use axes::{cluster_axes, GridAxes};
#[cfg(feature = "rayon")]
pub use correspondence::accumulate_par;
pub use corners::{chess_config, detect_candidates, Candidate};
pub use correspondence::{accumulate, CorrespondenceBuilder};
pub use detector::{ChessboardDetector, DetectionOutcome};
pub use grid_transform::{canonicalize, GridTransform, GRID_TRANSFORMS_D4};
pub use gridgraph::{
    assign_grid_coordinates, connected_components, nearest_neighbors, GridGraph,
    NeighborDirection, NodeNeighbor,
};
pub use params::{
    AxisClusteringParams, ChessboardDetectorParams, GridGraphParams, ResponseParams, SubPixParams,
};
pub use spec::{ChessboardSpec, ChessboardSpecError};
pub use subpix::{refine_corner, refine_corners};
