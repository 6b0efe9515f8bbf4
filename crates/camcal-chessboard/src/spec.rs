use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ChessboardSpecError {
    #[error("a chessboard needs at least 2x2 inner corners, got {cols}x{rows}")]
    TooFewCorners { cols: usize, rows: usize },
    #[error("square size must be positive and finite, got {0}")]
    InvalidSquareSize(f64),
}

/// Physical layout of a calibration chessboard.
///
/// `inner_corners` counts the corners where four squares meet, as
/// `(cols, rows)`; a board of 10×7 squares has 9×6 inner corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpec", into = "RawSpec")]
pub struct ChessboardSpec {
    inner_corners: (usize, usize),
    square_size: f64,
}

impl ChessboardSpec {
    pub fn new(cols: usize, rows: usize) -> Result<Self, ChessboardSpecError> {
        if cols < 2 || rows < 2 {
            return Err(ChessboardSpecError::TooFewCorners { cols, rows });
        }
        Ok(Self {
            inner_corners: (cols, rows),
            square_size: 1.0,
        })
    }

    pub fn with_square_size(self, square_size: f64) -> Result<Self, ChessboardSpecError> {
        if !(square_size.is_finite() && square_size > 0.0) {
            return Err(ChessboardSpecError::InvalidSquareSize(square_size));
        }
        Ok(Self {
            square_size,
            ..self
        })
    }

    pub fn cols(&self) -> usize {
        self.inner_corners.0
    }

    pub fn rows(&self) -> usize {
        self.inner_corners.1
    }

    pub fn inner_corners(&self) -> (usize, usize) {
        self.inner_corners
    }

    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    pub fn corner_count(&self) -> usize {
        self.cols() * self.rows()
    }

    /// Board-frame corner positions on the z = 0 plane, row-major:
    /// index `y * cols + x` is `(x * s, y * s, 0)`.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let s = self.square_size;
        (0..self.rows())
            .flat_map(|y| (0..self.cols()).map(move |x| Point3::new(x as f64 * s, y as f64 * s, 0.0)))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct RawSpec {
    cols: usize,
    rows: usize,
    #[serde(default = "unit_square")]
    square_size: f64,
}

fn unit_square() -> f64 {
    1.0
}

impl TryFrom<RawSpec> for ChessboardSpec {
    type Error = ChessboardSpecError;

    fn try_from(raw: RawSpec) -> Result<Self, Self::Error> {
        ChessboardSpec::new(raw.cols, raw.rows)?.with_square_size(raw.square_size)
    }
}

impl From<ChessboardSpec> for RawSpec {
    fn from(spec: ChessboardSpec) -> Self {
        RawSpec {
            cols: spec.cols(),
            rows: spec.rows(),
            square_size: spec.square_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major() {
        let spec = ChessboardSpec::new(3, 2)
            .and_then(|s| s.with_square_size(2.5))
            .expect("valid spec");
        let pts = spec.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[2], Point3::new(5.0, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 2.5, 0.0));
        assert_eq!(pts[5], Point3::new(5.0, 2.5, 0.0));
    }

    #[test]
    fn rejects_degenerate_boards() {
        assert_eq!(
            ChessboardSpec::new(1, 6),
            Err(ChessboardSpecError::TooFewCorners { cols: 1, rows: 6 })
        );
        let spec = ChessboardSpec::new(9, 6).expect("valid");
        assert!(spec.with_square_size(0.0).is_err());
        assert!(spec.with_square_size(f64::NAN).is_err());
    }

    #[test]
    fn json_goes_through_validation() {
        let spec: ChessboardSpec =
            serde_json::from_str(r#"{"cols": 9, "rows": 6}"#).expect("parse");
        assert_eq!(spec.inner_corners(), (9, 6));
        assert_eq!(spec.square_size(), 1.0);
        assert!(serde_json::from_str::<ChessboardSpec>(r#"{"cols": 1, "rows": 6}"#).is_err());
    }
}
