use gdal::spatial_ref::CoordTransform;
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::georef::PendingGeoreference;
use crate::point_cloud::PointCloud;

const CHUNK_SIZE: usize = 65_536;

/// Maps (lon, lat, altitude) points into the map plane of the pending
/// georeference. Z is carried through untouched; points the projection
/// cannot represent become invalid.
pub fn project_point_cloud(cloud: &PointCloud, georef: &PendingGeoreference) -> Result<PointCloud> {
    if georef.projection().is_geographic() {
        debug!("Geographic output, points stay in longitude/latitude");
        return Ok(cloud.clone());
    }

    info!("Projecting points with {}", georef.proj4());
    let source = georef.geographic_spatial_ref()?;
    let target = georef.spatial_ref()?;
    let transform = CoordTransform::new(&source, &target)?;

    let indices: Vec<usize> = cloud.valid_points().map(|(i, _)| i).collect();
    let mut points = cloud.points.clone();
    let mut dropped = 0usize;

    for chunk in indices.chunks(CHUNK_SIZE) {
        let mut xs: Vec<f64> = chunk.iter().map(|&i| cloud.points[i].x).collect();
        let mut ys: Vec<f64> = chunk.iter().map(|&i| cloud.points[i].y).collect();
        let mut zs = vec![0.0; chunk.len()];

        if transform.transform_coords(&mut xs, &mut ys, &mut zs).is_ok() {
            for (k, &i) in chunk.iter().enumerate() {
                if xs[k].is_finite() && ys[k].is_finite() {
                    points[i] = Vector3::new(xs[k], ys[k], cloud.points[i].z);
                } else {
                    points[i] = Vector3::zeros();
                    dropped += 1;
                }
            }
            continue;
        }

        // 一括変換に失敗した場合は点ごとに変換し、失敗した点は無効とする
        for &i in chunk {
            let p = cloud.points[i];
            let (mut x, mut y, mut z) = ([p.x], [p.y], [0.0]);
            match transform.transform_coords(&mut x, &mut y, &mut z) {
                Ok(()) if x[0].is_finite() && y[0].is_finite() => {
                    points[i] = Vector3::new(x[0], y[0], p.z);
                }
                _ => {
                    points[i] = Vector3::zeros();
                    dropped += 1;
                }
            }
        }
    }

    if dropped > 0 {
        warn!("{} points could not be projected and were discarded", dropped);
    }

    Ok(PointCloud::new(cloud.cols, cloud.rows, points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DatumPreset;
    use crate::point_cloud::is_valid;
    use crate::projection::Projection;

    #[test]
    fn test_geographic_is_identity() {
        let cloud = PointCloud::new(
            2,
            1,
            vec![Vector3::new(10.0, 20.0, 5.0), Vector3::zeros()],
        );
        let georef = PendingGeoreference::new(DatumPreset::Mars.datum(), Projection::Geographic);
        assert_eq!(project_point_cloud(&cloud, &georef).unwrap(), cloud);
    }

    #[test]
    fn test_mercator_keeps_elevation_and_sentinel() {
        let cloud = PointCloud::new(
            3,
            1,
            vec![
                Vector3::new(0.0, 0.0, 5.0),
                Vector3::zeros(),
                Vector3::new(1.0, 0.0, -7.0),
            ],
        );
        let datum = DatumPreset::Mars.datum();
        let radius = datum.semi_major_axis;
        let georef = PendingGeoreference::new(datum, Projection::cartesian_default());

        let projected = match project_point_cloud(&cloud, &georef) {
            Ok(projected) => projected,
            Err(e) => {
                eprintln!("Skipping test: PROJ unavailable ({e})");
                return;
            }
        };

        assert_eq!(projected.points[1], Vector3::zeros());
        assert!(projected.points[0].x.abs() < 1e-6);
        assert_eq!(projected.points[0].z, 5.0);

        // 赤道上の 1 度は R * pi / 180
        let expected = radius * 1f64.to_radians();
        assert!((projected.points[2].x - expected).abs() < 1e-3);
        assert_eq!(projected.points[2].z, -7.0);
    }

    #[test]
    fn test_far_side_of_orthographic_becomes_invalid() {
        let cloud = PointCloud::new(
            2,
            1,
            vec![Vector3::new(10.0, 5.0, 3.0), Vector3::new(180.0, 0.0, 9.0)],
        );
        let georef = PendingGeoreference::new(
            DatumPreset::Mars.datum(),
            Projection::Orthographic {
                center_lat: 0.0,
                center_lon: 0.0,
            },
        );

        let projected = match project_point_cloud(&cloud, &georef) {
            Ok(projected) => projected,
            Err(e) => {
                eprintln!("Skipping test: PROJ unavailable ({e})");
                return;
            }
        };

        assert_eq!(projected.points[1], Vector3::zeros());
        assert!(is_valid(&projected.points[0]));
        assert!(projected.points[0].x > 0.0);
        assert_eq!(projected.points[0].z, 3.0);
        assert_eq!(projected.valid_count(), 1);
    }
}
