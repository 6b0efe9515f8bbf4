//! Iterative sub-pixel corner refinement.
//!
//! At the true corner `q`, every image gradient `g` at a point `p` near the
//! corner is orthogonal to `p - q` (either `g ≈ 0` inside a flat square or
//! `p - q` runs along an edge). Solving `Σ w g gᵀ (p - q) = 0` in the least
//! squares sense gives
//!
//! ```text
//! q = (Σ w g gᵀ)⁻¹ Σ w g gᵀ p
//! ```
//!
//! which is iterated on a bilinearly resampled window until the update is
//! below `epsilon`.

use camcal_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

use crate::params::SubPixParams;

/// Refine a single corner. Returns the starting point unchanged when the
/// structure tensor is degenerate, and falls back to it if the iteration
/// leaves the search window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    half_window: usize,
    params: &SubPixParams,
) -> Point2<f64> {
    let hw = half_window.max(1) as i32;
    let side = (2 * hw + 3) as usize;
    let sigma2 = (hw * hw) as f64;

    // Gaussian weights exp(-d²/hw²) per axis.
    let weights: Vec<f64> = (-hw..=hw)
        .map(|d| (-(d * d) as f64 / sigma2).exp())
        .collect();

    let mut q = start;
    let mut patch = vec![0.0f32; side * side];
    for _ in 0..params.max_iterations.max(1) {
        // Patch covers [-hw-1, hw+1] around q so central differences exist
        // for every window pixel.
        for (r, row) in patch.chunks_exact_mut(side).enumerate() {
            let y = q.y + (r as i32 - hw - 1) as f64;
            for (c, px) in row.iter_mut().enumerate() {
                let x = q.x + (c as i32 - hw - 1) as f64;
                *px = sample_bilinear(img, x as f32, y as f32);
            }
        }

        let mut g = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for dy in -hw..=hw {
            let r = (dy + hw + 1) as usize;
            let wy = weights[(dy + hw) as usize];
            for dx in -hw..=hw {
                let c = (dx + hw + 1) as usize;
                let w = wy * weights[(dx + hw) as usize];
                let gx = 0.5 * (patch[r * side + c + 1] - patch[r * side + c - 1]) as f64;
                let gy = 0.5 * (patch[(r + 1) * side + c] - patch[(r - 1) * side + c]) as f64;

                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                g[(0, 0)] += gxx;
                g[(0, 1)] += gxy;
                g[(1, 0)] += gxy;
                g[(1, 1)] += gyy;
                let (px, py) = (dx as f64, dy as f64);
                b.x += gxx * px + gxy * py;
                b.y += gxy * px + gyy * py;
            }
        }

        let Some(delta) = g.try_inverse().map(|inv| inv * b) else {
            return start;
        };
        if !delta.x.is_finite() || !delta.y.is_finite() {
            return start;
        }

        q += delta;
        if (q - start).abs().max() > hw as f64 {
            return start;
        }
        if delta.norm() < params.epsilon {
            break;
        }
    }
    q
}

/// Effective window: the configured half window, optionally shrunk so it
/// stays within ~45% of the grid spacing and never reaches a neighbour.
pub fn effective_half_window(params: &SubPixParams, spacing: Option<f64>) -> usize {
    match spacing {
        Some(s) if params.clamp_to_spacing && s.is_finite() => {
            let cap = (0.45 * s).floor().max(2.0) as usize;
            params.half_window.min(cap)
        }
        _ => params.half_window,
    }
}

pub fn refine_corners(
    img: &GrayImageView<'_>,
    corners: &mut [Point2<f64>],
    spacing: Option<f64>,
    params: &SubPixParams,
) {
    let hw = effective_half_window(params, spacing);
    for c in corners.iter_mut() {
        *c = refine_corner(img, *c, hw, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    /// Anti-aliased X-junction at (cx, cy), 8×8 supersampled.
    fn junction(size: usize, cx: f64, cy: f64) -> GrayImage {
        let mut img = GrayImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let mut acc: f64 = 0.0;
                for sy in 0..8 {
                    for sx in 0..8 {
                        let px = x as f64 - 0.5 + (sx as f64 + 0.5) / 8.0;
                        let py = y as f64 - 0.5 + (sy as f64 + 0.5) / 8.0;
                        let dark = (px < cx) == (py < cy);
                        acc += if dark { 30.0 } else { 220.0 };
                    }
                }
                img.data[y * size + x] = (acc / 64.0).round() as u8;
            }
        }
        img
    }

    #[test]
    fn converges_to_subpixel_corner() {
        let img = junction(40, 19.3, 20.7);
        let refined = refine_corner(
            &img.view(),
            Point2::new(20.0, 20.0),
            5,
            &SubPixParams::default(),
        );
        assert!((refined.x - 19.3).abs() < 0.05, "{refined:?}");
        assert!((refined.y - 20.7).abs() < 0.05, "{refined:?}");
    }

    #[test]
    fn flat_patch_leaves_point_unchanged() {
        let img = GrayImage {
            width: 20,
            height: 20,
            data: vec![128; 400],
        };
        let p = Point2::new(10.2, 9.7);
        assert_eq!(refine_corner(&img.view(), p, 4, &SubPixParams::default()), p);
    }

    #[test]
    fn window_shrinks_with_spacing() {
        let p = SubPixParams::default();
        assert_eq!(effective_half_window(&p, Some(100.0)), 11);
        assert_eq!(effective_half_window(&p, Some(12.0)), 5);
        assert_eq!(effective_half_window(&p, None), 11);
        let fixed = SubPixParams {
            clamp_to_spacing: false,
            ..p
        };
        assert_eq!(effective_half_window(&fixed, Some(12.0)), 11);
    }
}
