use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Point2DemError>;

/// エラーの分類（設定 / データ / 出力）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Output,
}

#[derive(Debug, Error)]
pub enum Point2DemError {
    #[error("unknown reference spheroid '{0}', current options are [moon, mars]")]
    UnknownDatumPreset(String),

    #[error("invalid datum: {0}")]
    InvalidDatum(String),

    #[error("invalid projection parameters: {0}")]
    InvalidProjection(String),

    #[error("invalid rotation order '{0}', expected three of x, y, z (e.g. \"xyz\")")]
    InvalidRotationOrder(String),

    #[error("DEM spacing must not be negative, got {0}")]
    InvalidSpacing(f64),

    #[error("unsupported output file type '{0}' (expected tif, tiff or img)")]
    UnsupportedFileType(String),

    #[error("point cloud {path:?} must have 3 bands, found {bands}")]
    PointCloudBands { path: PathBuf, bands: usize },

    #[error("texture is {texture_cols}x{texture_rows} but the point cloud is {cols}x{rows}")]
    TextureMismatch {
        texture_cols: usize,
        texture_rows: usize,
        cols: usize,
        rows: usize,
    },

    #[error("point cloud contains no valid points")]
    EmptyPointCloud,

    #[error("bounding box of valid points has zero extent")]
    DegenerateExtent,

    #[error("raster of {cols}x{rows} cells is too large, increase the DEM spacing")]
    RasterTooLarge { cols: usize, rows: usize },

    #[error("failed to write {path:?}: {message}")]
    Output { path: PathBuf, message: String },

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),
}

impl Point2DemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownDatumPreset(_)
            | Self::InvalidDatum(_)
            | Self::InvalidProjection(_)
            | Self::InvalidRotationOrder(_)
            | Self::InvalidSpacing(_)
            | Self::UnsupportedFileType(_)
            | Self::PointCloudBands { .. }
            | Self::TextureMismatch { .. } => ErrorKind::Configuration,
            Self::EmptyPointCloud | Self::DegenerateExtent | Self::RasterTooLarge { .. } => {
                ErrorKind::Data
            }
            Self::Output { .. } => ErrorKind::Output,
            // 入力の読み込み失敗は設定エラーとして扱う
            Self::Gdal(_) => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Point2DemError::UnknownDatumPreset("europa".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Point2DemError::EmptyPointCloud.kind(), ErrorKind::Data);
        assert_eq!(
            Point2DemError::Output {
                path: PathBuf::from("a.offset"),
                message: "denied".into()
            }
            .kind(),
            ErrorKind::Output
        );
    }

    #[test]
    fn test_unknown_preset_message_lists_options() {
        let msg = Point2DemError::UnknownDatumPreset("europa".into()).to_string();
        assert!(msg.contains("europa"));
        assert!(msg.contains("mars"));
    }
}
