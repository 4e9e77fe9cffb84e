use std::path::Path;

use gdal::Dataset;
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{Point2DemError, Result};

/// 標高チャンネル (Z)
pub const ELEVATION_CHANNEL: usize = 2;

/// Dense raster of 3-vectors, one per source pixel. The zero vector marks
/// a pixel without a 3-D sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub cols: usize,
    pub rows: usize,
    pub points: Vec<Vector3<f64>>,
}

#[inline]
pub fn is_valid(point: &Vector3<f64>) -> bool {
    *point != Vector3::zeros()
}

impl PointCloud {
    pub(crate) fn new(cols: usize, rows: usize, points: Vec<Vector3<f64>>) -> Self {
        debug_assert_eq!(points.len(), cols * rows);
        Self { cols, rows, points }
    }

    /// 3バンド (X, Y, Z) のラスタを読み込む
    pub fn open(path: &Path) -> Result<Self> {
        info!("Reading point cloud: {:?}", path);
        let dataset = Dataset::open(path)?;

        let bands = dataset.raster_count() as usize;
        if bands != 3 {
            return Err(Point2DemError::PointCloudBands {
                path: path.to_path_buf(),
                bands,
            });
        }

        let (cols, rows) = dataset.raster_size();
        let mut channels = Vec::with_capacity(3);
        for index in 1..=3 {
            let band = dataset.rasterband(index)?;
            let (_, values) = band.read_band_as::<f64>()?.into_shape_and_vec();
            channels.push(values);
        }

        let points = (0..cols * rows)
            .map(|i| Vector3::new(channels[0][i], channels[1][i], channels[2][i]))
            .collect();

        let cloud = Self::new(cols, rows, points);
        debug!(
            "Point cloud {}x{} with {} valid points",
            cols,
            rows,
            cloud.valid_count()
        );
        Ok(cloud)
    }

    pub fn get(&self, col: usize, row: usize) -> &Vector3<f64> {
        &self.points[row * self.cols + col]
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| is_valid(p)).count()
    }

    pub fn valid_points(&self) -> impl Iterator<Item = (usize, &Vector3<f64>)> {
        self.points.iter().enumerate().filter(|(_, p)| is_valid(p))
    }
}
