use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};

use crate::datum::Datum;
use crate::error::Result;
use crate::projection::Projection;

/// GDAL order: `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
pub type GeoTransform = [f64; 6];

fn spatial_ref(proj4: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_proj4(proj4)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Datum and projection known, affine transform not yet available.
/// Sufficient for point reprojection, which never touches pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGeoreference {
    datum: Datum,
    projection: Projection,
}

impl PendingGeoreference {
    pub fn new(datum: Datum, projection: Projection) -> Self {
        Self { datum, projection }
    }

    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn proj4(&self) -> String {
        if self.projection.is_geographic() {
            return self.geographic_proj4();
        }
        format!(
            "{} {} +units=m +no_defs",
            self.projection.proj4(),
            self.datum.proj4_params()
        )
    }

    /// 同じ楕円体上の経緯度座標系
    pub fn geographic_proj4(&self) -> String {
        format!("+proj=longlat {} +no_defs", self.datum.proj4_params())
    }

    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        spatial_ref(&self.proj4())
    }

    pub fn geographic_spatial_ref(&self) -> Result<SpatialRef> {
        spatial_ref(&self.geographic_proj4())
    }

    /// The only way to obtain a [`Georeference`].
    pub fn finalize(self, transform: GeoTransform) -> Georeference {
        Georeference {
            datum: self.datum,
            projection: self.projection,
            transform,
        }
    }
}

/// Complete georeference: datum, projection and pixel-to-map transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Georeference {
    datum: Datum,
    projection: Projection,
    transform: GeoTransform,
}

impl Georeference {
    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn pixel_to_point(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.transform;
        (
            t[0] + col * t[1] + row * t[2],
            t[3] + col * t[4] + row * t[5],
        )
    }

    /// 北向き（回転なし）を前提とする
    #[cfg(test)]
    pub fn point_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let t = &self.transform;
        ((x - t[0]) / t[1], (y - t[3]) / t[5])
    }

    pub fn to_wkt(&self) -> Result<String> {
        let pending = PendingGeoreference::new(self.datum.clone(), self.projection);
        Ok(pending.spatial_ref()?.to_wkt()?)
    }
}
