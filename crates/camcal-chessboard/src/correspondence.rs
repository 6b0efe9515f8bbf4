//! Accumulating board/image correspondences over a calibration image set.

use camcal_core::{Correspondence, CorrespondenceSet, GrayImageView, ImageSize};
use nalgebra::Point3;

use crate::detector::{ChessboardDetector, DetectionOutcome};

/// Incremental builder; [`accumulate`] drives it over a whole sequence.
pub struct CorrespondenceBuilder<'d> {
    detector: &'d ChessboardDetector,
    object_points: Vec<Point3<f64>>,
    set: CorrespondenceSet,
    next_index: usize,
}

impl<'d> CorrespondenceBuilder<'d> {
    pub fn new(detector: &'d ChessboardDetector) -> Self {
        Self {
            detector,
            object_points: detector.spec().object_points(),
            set: CorrespondenceSet::new(),
            next_index: 0,
        }
    }

    /// Detect the board in the next image. Returns `true` if it contributed
    /// a correspondence.
    pub fn add(&mut self, img: &GrayImageView<'_>) -> bool {
        let index = self.next_index;
        self.next_index += 1;
        if !self.accepts_size(index, img.size()) {
            return false;
        }
        let outcome = self.detector.detect(img);
        self.record(index, img.size(), outcome)
    }

    /// Count the next image as unusable without running the detector, e.g.
    /// when it could not be decoded.
    pub fn skip(&mut self) {
        self.set.skipped.push(self.next_index);
        self.next_index += 1;
    }

    fn accepts_size(&mut self, index: usize, size: ImageSize) -> bool {
        match self.set.image_size {
            Some(expected) if expected != size => {
                log::warn!(
                    "image {index}: {}x{} differs from {}x{} of earlier images, skipped",
                    size.width,
                    size.height,
                    expected.width,
                    expected.height
                );
                self.set.skipped.push(index);
                false
            }
            _ => true,
        }
    }

    fn record(&mut self, index: usize, size: ImageSize, outcome: DetectionOutcome) -> bool {
        let Some(corners) = outcome.into_corners() else {
            log::info!("image {index}: chessboard not found, skipped");
            self.set.skipped.push(index);
            return false;
        };
        match Correspondence::new(self.object_points.clone(), corners, index) {
            Ok(c) => {
                log::debug!("image {index}: {} corners", c.len());
                self.set.image_size.get_or_insert(size);
                self.set.push(c);
                true
            }
            Err(e) => {
                log::warn!("image {index}: {e}, skipped");
                self.set.skipped.push(index);
                false
            }
        }
    }

    pub fn finish(self) -> CorrespondenceSet {
        log::info!(
            "board found in {} of {} images",
            self.set.len(),
            self.next_index
        );
        self.set
    }
}

/// Run the detector over every image and collect correspondences.
///
/// Images where the board is not found are skipped with an info log; images
/// whose resolution differs from the first accepted one are skipped with a
/// warning. An empty input yields an empty set.
pub fn accumulate<'a, I>(images: I, detector: &ChessboardDetector) -> CorrespondenceSet
where
    I: IntoIterator<Item = GrayImageView<'a>>,
{
    let mut builder = CorrespondenceBuilder::new(detector);
    for img in images {
        builder.add(&img);
    }
    builder.finish()
}

/// Parallel [`accumulate`]: detection runs on the rayon pool, results are
/// merged in input order so the output is identical to the sequential one.
#[cfg(feature = "rayon")]
pub fn accumulate_par(images: &[GrayImageView<'_>], detector: &ChessboardDetector) -> CorrespondenceSet {
    use rayon::prelude::*;

    let outcomes: Vec<DetectionOutcome> = images.par_iter().map(|img| detector.detect(img)).collect();

    let mut builder = CorrespondenceBuilder::new(detector);
    for (img, outcome) in images.iter().zip(outcomes) {
        let index = builder.next_index;
        builder.next_index += 1;
        if builder.accepts_size(index, img.size()) {
            builder.record(index, img.size(), outcome);
        }
    }
    builder.finish()
}

