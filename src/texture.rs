use std::path::Path;

use gdal::raster::GdalDataType;
use gdal::Dataset;
use tracing::info;

/// Grayscale raster sharing the point cloud's pixel grid. Values are
/// normalised to `[0, 1]` for integer sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub cols: usize,
    pub rows: usize,
    pub values: Vec<f32>,
}

impl Texture {
    pub(crate) fn new(cols: usize, rows: usize, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), cols * rows);
        Self { cols, rows, values }
    }

    pub fn open(path: &Path) -> crate::error::Result<Self> {
        info!("Reading texture: {:?}", path);
        let dataset = Dataset::open(path)?;
        let (cols, rows) = dataset.raster_size();
        let band = dataset.rasterband(1)?;

        let scale = match band.band_type() {
            GdalDataType::UInt8 => u8::MAX as f32,
            GdalDataType::UInt16 => u16::MAX as f32,
            GdalDataType::Int16 => i16::MAX as f32,
            _ => 1.0,
        };

        let (_, values) = band.read_band_as::<f32>()?.into_shape_and_vec();
        let values = values.into_iter().map(|v| v / scale).collect();
        Ok(Self::new(cols, rows, values))
    }
}
