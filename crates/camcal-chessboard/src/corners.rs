//! ChESS corner candidates from the `chess-corners` detector.

use camcal_core::GrayImageView;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Point2;

use crate::params::ResponseParams;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// X-junction candidate in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Point2<f64>,
    /// Dominant edge direction, radians in `[0, π)`.
    pub orientation: f32,
    pub strength: f32,
}

/// Single-scale ChESS configuration for the given response parameters.
pub fn chess_config(params: &ResponseParams) -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = params.threshold_rel as _;
    cfg.params.nms_radius = params.nms_radius as _;
    cfg
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Candidate {
    Candidate {
        position: Point2::new(c.x as f64, c.y as f64),
        orientation: c.orientation,
        strength: c.response,
    }
}

/// Run the ChESS detector over `img`.
///
/// Invalid buffers yield no candidates.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = img.width, height = img.height))
)]
pub fn detect_candidates(img: &GrayImageView<'_>, params: &ResponseParams) -> Vec<Candidate> {
    let (Ok(w), Ok(h)) = (u32::try_from(img.width), u32::try_from(img.height)) else {
        return Vec::new();
    };
    let Some(gray) = image::GrayImage::from_raw(w, h, img.data.to_vec()) else {
        log::debug!("buffer of {} bytes is not {}x{}", img.data.len(), w, h);
        return Vec::new();
    };

    let cfg = chess_config(params);
    let out: Vec<Candidate> = find_chess_corners_image(&gray, &cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect();
    log::debug!("{} ChESS candidates", out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    /// Four quadrants meeting at (cx, cy), pixel centres at integer coords.
    fn x_junction(size: usize, cx: f64, cy: f64) -> GrayImage {
        let mut img = GrayImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let dark = ((x as f64) < cx) == ((y as f64) < cy);
                img.data[y * size + x] = if dark { 20 } else { 230 };
            }
        }
        img
    }

    #[test]
    fn x_junction_is_the_strongest_candidate() {
        let img = x_junction(41, 20.5, 20.5);
        let cands = detect_candidates(&img.view(), &ResponseParams::default());
        let best = cands
            .iter()
            .max_by(|a, b| a.strength.total_cmp(&b.strength))
            .expect("at least one candidate");
        let p = best.position;
        assert!((p.x - 20.5).abs() < 1.0 && (p.y - 20.5).abs() < 1.0, "{p:?}");
    }

    #[test]
    fn straight_edge_yields_no_candidates() {
        let mut img = GrayImage::new(32, 32);
        for y in 0..32 {
            for x in 16..32 {
                img.data[y * 32 + x] = 255;
            }
        }
        assert!(detect_candidates(&img.view(), &ResponseParams::default()).is_empty());
    }

    #[test]
    fn short_buffer_yields_no_candidates() {
        let data = vec![0u8; 10];
        let view = GrayImageView {
            width: 8,
            height: 8,
            data: &data,
        };
        assert!(detect_candidates(&view, &ResponseParams::default()).is_empty());
    }

    #[test]
    fn config_carries_threshold_and_radius() {
        let params = ResponseParams {
            threshold_rel: 0.35,
            nms_radius: 4,
        };
        let cfg = chess_config(&params);
        assert_eq!(cfg.params.threshold_rel as f32, 0.35);
        assert_eq!(cfg.params.nms_radius as usize, 4);
    }
}
