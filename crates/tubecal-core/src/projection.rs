use crate::bank::{CalibrationRow, DetectorId, TubeAxis};
use nalgebra::{Point3, Vector3};

/// Errors raised while projecting corrected pixel positions into 3D.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("tube has non-positive length {0}")]
    DegenerateTube(f64),
    #[error("tube has {detectors} detectors but {positions} corrected positions")]
    ArityMismatch { detectors: usize, positions: usize },
}

/// Place every pixel of a tube along the tube direction.
///
/// `first` and `last` are the uncalibrated positions of the tube's end
/// pixels. The tube centre keeps its cross-tube coordinates, loses its
/// component along `axis` (corrected positions are absolute coordinates along
/// the tube) and is lifted by `vertical_offset` along Y. Pixel `i` ends up at
/// `centre + unit * corrected[i]`.
pub fn project_tube(
    first: Point3<f64>,
    last: Point3<f64>,
    corrected: &[f64],
    detector_ids: &[DetectorId],
    axis: TubeAxis,
    vertical_offset: f64,
) -> Result<Vec<CalibrationRow>, ProjectionError> {
    let span: Vector3<f64> = last - first;
    let length = span.norm();
    if !length.is_finite() || length <= 0.0 {
        return Err(ProjectionError::DegenerateTube(length));
    }
    if corrected.len() != detector_ids.len() {
        return Err(ProjectionError::ArityMismatch {
            detectors: detector_ids.len(),
            positions: corrected.len(),
        });
    }

    let unit = span / length;
    let mut centre = nalgebra::center(&first, &last);
    centre[axis.index()] = 0.0;
    centre.y += vertical_offset;

    Ok(detector_ids
        .iter()
        .zip(corrected)
        .map(|(&detector_id, &p)| CalibrationRow {
            detector_id,
            position: centre + unit * p,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projects_along_the_tube_direction() {
        let rows = project_tube(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            &[0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0],
            &[10, 11, 12, 13],
            TubeAxis::Z,
            0.0,
        )
        .unwrap();
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        assert_eq!(rows.len(), 4);
        for (row, z) in rows.iter().zip(expected) {
            assert_relative_eq!(row.position, Point3::new(0.0, 0.0, z), epsilon = 1e-12);
        }
        assert_eq!(rows[2].detector_id, 12);
    }

    #[test]
    fn keeps_cross_tube_coordinates_and_applies_vertical_offset() {
        let rows = project_tube(
            Point3::new(-0.5, 0.2, 4.0),
            Point3::new(0.5, 0.2, 4.0),
            &[-0.45, 0.0, 0.3],
            &[1, 2, 3],
            TubeAxis::X,
            0.01,
        )
        .unwrap();
        assert_relative_eq!(rows[0].position, Point3::new(-0.45, 0.21, 4.0), epsilon = 1e-12);
        assert_relative_eq!(rows[2].position, Point3::new(0.3, 0.21, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn rejects_zero_length_and_arity_mismatch() {
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(
            project_tube(p, p, &[0.0], &[1], TubeAxis::X, 0.0),
            Err(ProjectionError::DegenerateTube(0.0))
        );
        let q = Point3::new(2.0, 2.0, 3.0);
        assert_eq!(
            project_tube(p, q, &[0.0, 1.0], &[1], TubeAxis::X, 0.0),
            Err(ProjectionError::ArityMismatch {
                detectors: 1,
                positions: 2
            })
        );
    }
}
