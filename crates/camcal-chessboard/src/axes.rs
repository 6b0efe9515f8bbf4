//! Dominant grid directions from nearest-neighbour edge angles.
//!
//! Edge angles are undirected (defined mod π). A smoothed circular histogram
//! provides two well separated seeds which are then refined by a 2-means
//! iteration in double-angle space.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;

use crate::params::AxisClusteringParams;

/// Two grid axes as angles in [0, π).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridAxes {
    pub angles: [f64; 2],
}

impl GridAxes {
    /// Unit direction of axis `k`.
    pub fn unit(&self, k: usize) -> Vector2<f64> {
        let t = self.angles[k];
        Vector2::new(t.cos(), t.sin())
    }

    /// Closest axis to an undirected angle and the angular distance to it.
    pub fn classify(&self, theta: f64) -> (usize, f64) {
        let d0 = angular_dist_pi(theta, self.angles[0]);
        let d1 = angular_dist_pi(theta, self.angles[1]);
        if d0 <= d1 {
            (0, d0)
        } else {
            (1, d1)
        }
    }
}

/// Wrap an angle to [0, π).
pub(crate) fn wrap_angle_pi(theta: f64) -> f64 {
    let t = theta.rem_euclid(PI);
    if t >= PI {
        0.0
    } else {
        t
    }
}

/// Smallest angular distance with period π, in [0, π/2].
pub(crate) fn angular_dist_pi(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d).min(FRAC_PI_2)
}

fn angle_to_bin(theta: f64, num_bins: usize) -> usize {
    let x = wrap_angle_pi(theta) / PI * num_bins as f64;
    (x.floor() as usize).min(num_bins - 1)
}

fn bin_to_angle(bin: usize, num_bins: usize) -> f64 {
    (bin as f64 + 0.5) * PI / num_bins as f64
}

fn smooth_circular_histogram(hist: &[f64]) -> Vec<f64> {
    const K: [f64; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    let n = hist.len() as isize;
    (0..n)
        .map(|i| {
            K.iter()
                .enumerate()
                .map(|(k, w)| w * hist[(i + k as isize - 2).rem_euclid(n) as usize])
                .sum::<f64>()
                / 16.0
        })
        .collect()
}

/// Double-angle mean of undirected angles.
fn mean_axis(angles: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = Vector2::<f64>::zeros();
    let mut count = 0usize;
    for t in angles {
        sum += Vector2::new((2.0 * t).cos(), (2.0 * t).sin());
        count += 1;
    }
    if count == 0 || sum.norm_squared() < 1e-12 {
        return None;
    }
    Some(wrap_angle_pi(0.5 * sum.y.atan2(sum.x)))
}

/// Find the two dominant axes among undirected edge angles.
pub fn cluster_axes(angles: &[f64], params: &AxisClusteringParams) -> Option<GridAxes> {
    if angles.len() < 2 || params.num_bins < 4 {
        return None;
    }

    let mut hist = vec![0.0f64; params.num_bins];
    for &t in angles {
        hist[angle_to_bin(t, params.num_bins)] += 1.0;
    }
    let smooth = smooth_circular_histogram(&hist);

    let n = smooth.len();
    let mut peaks: Vec<usize> = (0..n)
        .filter(|&i| {
            let v = smooth[i];
            v > 0.0 && v >= smooth[(i + n - 1) % n] && v >= smooth[(i + 1) % n]
        })
        .collect();
    peaks.sort_by(|&a, &b| smooth[b].total_cmp(&smooth[a]));

    let first = *peaks.first()?;
    let seed0 = bin_to_angle(first, n);
    let min_sep = params.min_separation_deg.to_radians();
    let second = peaks
        .iter()
        .copied()
        .find(|&p| angular_dist_pi(bin_to_angle(p, n), seed0) >= min_sep)?;

    let mut centers = [seed0, bin_to_angle(second, n)];
    let outlier = params.outlier_threshold_deg.to_radians();
    let mut labels: Vec<Option<usize>> = vec![None; angles.len()];

    for _ in 0..params.max_iters.max(1) {
        let axes = GridAxes { angles: centers };
        let mut changed = false;
        for (lbl, &t) in labels.iter_mut().zip(angles) {
            let (k, d) = axes.classify(t);
            let new = (d <= outlier).then_some(k);
            if *lbl != new {
                *lbl = new;
                changed = true;
            }
        }

        for (k, center) in centers.iter_mut().enumerate() {
            let members = angles
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == Some(k))
                .map(|(&t, _)| t);
            if let Some(m) = mean_axis(members) {
                *center = m;
            }
        }

        if !changed {
            break;
        }
    }

    if angular_dist_pi(centers[0], centers[1]) < min_sep {
        log::debug!("grid axes collapsed: {centers:?}");
        return None;
    }
    Some(GridAxes { angles: centers })
}
