use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::image::ImageSize;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("{object} object points but {image} image points")]
    LengthMismatch { object: usize, image: usize },
}

/// Board points and their observed pixel positions in one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    object_points: Vec<Point3<f64>>,
    image_points: Vec<Point2<f64>>,
    /// Position of the source image in the caller's input sequence.
    pub source_index: usize,
}

impl Correspondence {
    pub fn new(
        object_points: Vec<Point3<f64>>,
        image_points: Vec<Point2<f64>>,
        source_index: usize,
    ) -> Result<Self, CorrespondenceError> {
        if object_points.len() != image_points.len() {
            return Err(CorrespondenceError::LengthMismatch {
                object: object_points.len(),
                image: image_points.len(),
            });
        }
        Ok(Self {
            object_points,
            image_points,
            source_index,
        })
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }
}

/// Correspondences from every image where the board was found, in input
/// order. Indices of images that contributed nothing are kept in `skipped`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub correspondences: Vec<Correspondence>,
    /// Resolution shared by all contributing images.
    pub image_size: Option<ImageSize>,
    pub skipped: Vec<usize>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Correspondence> {
        self.correspondences.iter()
    }

    pub fn push(&mut self, c: Correspondence) {
        self.correspondences.push(c);
    }

    /// Total number of point pairs over all views.
    pub fn point_count(&self) -> usize {
        self.correspondences.iter().map(Correspondence::len).sum()
    }
}

impl<'a> IntoIterator for &'a CorrespondenceSet {
    type Item = &'a Correspondence;
    type IntoIter = std::slice::Iter<'a, Correspondence>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_checks_lengths() {
        let obj = vec![Point3::origin(); 3];
        let img = vec![Point2::origin(); 2];
        assert_eq!(
            Correspondence::new(obj.clone(), img, 0),
            Err(CorrespondenceError::LengthMismatch {
                object: 3,
                image: 2
            })
        );
        let c = Correspondence::new(obj, vec![Point2::origin(); 3], 4).expect("equal lengths");
        assert_eq!(c.len(), 3);
        assert_eq!(c.source_index, 4);
    }

    #[test]
    fn set_counts_points() {
        let mut set = CorrespondenceSet::new();
        assert!(set.is_empty());
        for i in 0..2 {
            set.push(
                Correspondence::new(vec![Point3::origin(); 4], vec![Point2::origin(); 4], i)
                    .expect("valid"),
            );
        }
        assert_eq!(set.len(), 2);
        assert_eq!(set.point_count(), 8);
        assert_eq!((&set).into_iter().count(), 2);
    }
}
