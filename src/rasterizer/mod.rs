//! Contract between the pipeline and a point-cloud rasterizer.
//!
//! The pipeline only talks to [`Rasterizer`]; [`OrthoRasterizer`] is the
//! bundled implementation and any other binning or interpolation scheme
//! can be substituted.

mod ortho;

pub use ortho::OrthoRasterizer;

use nalgebra::Vector3;

use crate::error::Result;
use crate::georef::GeoTransform;
use crate::texture::Texture;

/// Axis aligned bounds of the valid points (x, y in map units, z elevation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// ラスタ原点の画素オフセット（0 方向へ切り捨て）
    pub fn pixel_offset(&self, spacing: f64) -> (i32, i32) {
        (
            (self.min.x / spacing) as i32,
            -((self.max.y / spacing) as i32),
        )
    }
}

/// What fills cells that received no points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Minimum observed elevation.
    MinZ,
    Explicit(f32),
}

impl DefaultValue {
    /// Used for orthoimage passes, where an elevation-derived fill would
    /// bleed into the texture.
    pub fn without_min(self) -> Self {
        match self {
            Self::MinZ => Self::Explicit(0.0),
            explicit => explicit,
        }
    }

    pub fn explicit(self) -> Option<f32> {
        match self {
            Self::MinZ => None,
            Self::Explicit(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationPolicy {
    pub default_value: DefaultValue,
    pub use_alpha: bool,
}

impl Default for RasterizationPolicy {
    fn default() -> Self {
        Self {
            default_value: DefaultValue::MinZ,
            use_alpha: false,
        }
    }
}

/// One rasterized pass. `alpha` is present when the policy asks for it:
/// 255 where points landed, 0 where the default value was used.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub cols: usize,
    pub rows: usize,
    pub values: Vec<f32>,
    pub alpha: Option<Vec<u8>>,
}

impl RasterGrid {
    #[cfg(test)]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.values[row * self.cols + col]
    }
}

pub trait Rasterizer {
    /// Computes the extent on first use. Fails on an empty point cloud.
    fn bounding_box(&self) -> Result<BoundingBox>;

    fn geo_transform(&self) -> Result<GeoTransform>;

    /// Effective grid spacing, always strictly positive.
    fn spacing(&self) -> Result<f64>;

    fn dimensions(&self) -> Result<(usize, usize)>;

    fn policy(&self) -> RasterizationPolicy;

    fn set_default_value(&mut self, default_value: DefaultValue);

    fn set_use_alpha(&mut self, use_alpha: bool);

    /// Attaches a texture sharing the point cloud's pixel grid; subsequent
    /// passes rasterize texture values instead of elevation.
    fn set_texture(&mut self, texture: Texture) -> Result<()>;

    fn rasterize(&self) -> Result<RasterGrid>;
}
