use std::cell::OnceCell;

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info};

use super::{BoundingBox, DefaultValue, RasterGrid, RasterizationPolicy, Rasterizer};
use crate::error::{Point2DemError, Result};
use crate::georef::GeoTransform;
use crate::point_cloud::{is_valid, PointCloud};
use crate::texture::Texture;

const MAX_CELLS: usize = 1 << 31;

#[inline]
fn has_finite_position(p: &Vector3<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extent {
    bbox: BoundingBox,
    spacing: f64,
    cols: usize,
    rows: usize,
}

/// Pixel-as-point grid binning. Every cell takes the mean value of the
/// points that fall nearest to its centre.
#[derive(Debug)]
pub struct OrthoRasterizer {
    cloud: PointCloud,
    channel: usize,
    requested_spacing: f64,
    policy: RasterizationPolicy,
    texture: Option<Texture>,
    extent: OnceCell<Extent>,
}

impl OrthoRasterizer {
    /// `spacing` of 0 derives the spacing from the point density.
    pub fn new(cloud: PointCloud, channel: usize, spacing: f64) -> Self {
        Self {
            cloud,
            channel,
            requested_spacing: spacing,
            policy: RasterizationPolicy::default(),
            texture: None,
            extent: OnceCell::new(),
        }
    }

    fn extent(&self) -> Result<Extent> {
        if let Some(extent) = self.extent.get() {
            return Ok(*extent);
        }
        let extent = self.compute_extent()?;
        let _ = self.extent.set(extent);
        Ok(extent)
    }

    fn compute_extent(&self) -> Result<Extent> {
        let mut valid = 0usize;
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for (_, p) in self.cloud.valid_points() {
            let q = Vector3::new(p.x, p.y, p[self.channel]);
            if !q.iter().all(|v| v.is_finite()) {
                continue;
            }
            min = min.inf(&q);
            max = max.sup(&q);
            valid += 1;
        }

        if valid == 0 {
            return Err(Point2DemError::EmptyPointCloud);
        }

        let bbox = BoundingBox { min, max };
        if bbox.width() <= 0.0 && bbox.height() <= 0.0 {
            return Err(Point2DemError::DegenerateExtent);
        }

        let spacing = if self.requested_spacing > 0.0 {
            self.requested_spacing
        } else {
            self.auto_spacing(&bbox, valid)
        };

        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(Point2DemError::InvalidSpacing(spacing));
        }

        // usize へのキャスト前に f64 のまま上限を確認する
        let cols = (bbox.width() / spacing).round() + 1.0;
        let rows = (bbox.height() / spacing).round() + 1.0;
        if !(cols.is_finite() && rows.is_finite()) || cols * rows > MAX_CELLS as f64 {
            return Err(Point2DemError::RasterTooLarge {
                cols: cols as usize,
                rows: rows as usize,
            });
        }
        let (cols, rows) = (cols as usize, rows as usize);

        info!(
            "DEM bounding box: ({}, {}, {}) - ({}, {}, {}), spacing {}, {}x{} cells",
            min.x, min.y, min.z, max.x, max.y, max.z, spacing, cols, rows
        );

        Ok(Extent {
            bbox,
            spacing,
            cols,
            rows,
        })
    }

    /// 水平方向に隣接する有効点間の平均距離
    fn auto_spacing(&self, bbox: &BoundingBox, valid: usize) -> f64 {
        let cloud = &self.cloud;
        let mut total = 0.0;
        let mut pairs = 0usize;
        for row in 0..cloud.rows {
            for col in 1..cloud.cols {
                let a = cloud.get(col - 1, row);
                let b = cloud.get(col, row);
                if !is_valid(a) || !is_valid(b) {
                    continue;
                }
                if !has_finite_position(a) || !has_finite_position(b) {
                    continue;
                }
                let d = (b.x - a.x).hypot(b.y - a.y);
                if d.is_finite() && d > 0.0 {
                    total += d;
                    pairs += 1;
                }
            }
        }

        if pairs > 0 {
            let spacing = total / pairs as f64;
            debug!("Auto spacing {} from {} neighbour pairs", spacing, pairs);
            return spacing;
        }

        let area = bbox.width() * bbox.height();
        if area > 0.0 {
            (area / valid as f64).sqrt()
        } else {
            bbox.width().max(bbox.height()) / valid as f64
        }
    }
}

impl Rasterizer for OrthoRasterizer {
    fn bounding_box(&self) -> Result<BoundingBox> {
        Ok(self.extent()?.bbox)
    }

    fn geo_transform(&self) -> Result<GeoTransform> {
        let Extent { bbox, spacing, .. } = self.extent()?;
        Ok([
            bbox.min.x - spacing / 2.0,
            spacing,
            0.0,
            bbox.max.y + spacing / 2.0,
            0.0,
            -spacing,
        ])
    }

    fn spacing(&self) -> Result<f64> {
        Ok(self.extent()?.spacing)
    }

    fn dimensions(&self) -> Result<(usize, usize)> {
        let extent = self.extent()?;
        Ok((extent.cols, extent.rows))
    }

    fn policy(&self) -> RasterizationPolicy {
        self.policy
    }

    fn set_default_value(&mut self, default_value: DefaultValue) {
        self.policy.default_value = default_value;
    }

    fn set_use_alpha(&mut self, use_alpha: bool) {
        self.policy.use_alpha = use_alpha;
    }

    fn set_texture(&mut self, texture: Texture) -> Result<()> {
        if texture.cols != self.cloud.cols || texture.rows != self.cloud.rows {
            return Err(Point2DemError::TextureMismatch {
                texture_cols: texture.cols,
                texture_rows: texture.rows,
                cols: self.cloud.cols,
                rows: self.cloud.rows,
            });
        }
        self.texture = Some(texture);
        Ok(())
    }

    fn rasterize(&self) -> Result<RasterGrid> {
        let Extent {
            bbox,
            spacing,
            cols,
            rows,
        } = self.extent()?;

        let mut sums = vec![0.0f64; cols * rows];
        let mut counts = vec![0u32; cols * rows];
        for (i, p) in self.cloud.valid_points() {
            let value = match &self.texture {
                Some(texture) => f64::from(texture.values[i]),
                None => p[self.channel],
            };
            if !value.is_finite() || !has_finite_position(p) {
                continue;
            }
            let col = (((p.x - bbox.min.x) / spacing).round() as usize).min(cols - 1);
            let row = (((bbox.max.y - p.y) / spacing).round() as usize).min(rows - 1);
            sums[row * cols + col] += value;
            counts[row * cols + col] += 1;
        }

        let fill = match self.policy.default_value {
            DefaultValue::MinZ => bbox.min.z as f32,
            DefaultValue::Explicit(value) => value,
        };

        let values = sums
            .par_iter()
            .zip(counts.par_iter())
            .map(|(&sum, &count)| {
                if count > 0 {
                    (sum / f64::from(count)) as f32
                } else {
                    fill
                }
            })
            .collect();

        let alpha = self.policy.use_alpha.then(|| {
            counts
                .par_iter()
                .map(|&count| if count > 0 { u8::MAX } else { 0 })
                .collect()
        });

        Ok(RasterGrid {
            cols,
            rows,
            values,
            alpha,
        })
    }
}
