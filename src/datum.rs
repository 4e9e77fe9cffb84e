use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{Point2DemError, Result};

/// MOLA PEDR の標準球半径 (m)
pub const MARS_RADIUS: f64 = 3_396_000.0;

/// 月の標準球半径 (m)
pub const MOON_RADIUS: f64 = 1_737_400.0;

const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;
const WGS84_SEMI_MINOR: f64 = 6_356_752.314_245;

/// Reference ellipsoid and meridian used to interpret geodetic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub name: String,
    pub spheroid_name: String,
    pub meridian_name: String,
    pub semi_major_axis: f64,
    pub semi_minor_axis: f64,
    pub meridian_offset: f64,
}

impl Datum {
    pub fn new(
        name: impl Into<String>,
        spheroid_name: impl Into<String>,
        semi_major_axis: f64,
        semi_minor_axis: f64,
    ) -> Self {
        Self {
            name: name.into(),
            spheroid_name: spheroid_name.into(),
            meridian_name: "Reference Meridian".to_string(),
            semi_major_axis,
            semi_minor_axis,
            meridian_offset: 0.0,
        }
    }

    pub fn wgs84() -> Self {
        let mut datum = Self::new("WGS_1984", "WGS 84", WGS84_SEMI_MAJOR, WGS84_SEMI_MINOR);
        datum.meridian_name = "Greenwich".to_string();
        datum
    }

    pub fn is_sphere(&self) -> bool {
        self.semi_major_axis == self.semi_minor_axis
    }

    /// 第一離心率の二乗
    pub fn eccentricity_squared(&self) -> f64 {
        let a = self.semi_major_axis;
        let b = self.semi_minor_axis;
        1.0 - (b * b) / (a * a)
    }

    /// PROJ 形式の楕円体パラメータ
    pub fn proj4_params(&self) -> String {
        let mut params = format!("+a={} +b={}", self.semi_major_axis, self.semi_minor_axis);
        if self.meridian_offset != 0.0 {
            params.push_str(&format!(" +pm={}", self.meridian_offset));
        }
        params
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Hard coded reference bodies selectable by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumPreset {
    Mars,
    Moon,
}

impl DatumPreset {
    pub fn radius(self) -> f64 {
        match self {
            Self::Mars => MARS_RADIUS,
            Self::Moon => MOON_RADIUS,
        }
    }

    pub fn datum(self) -> Datum {
        let radius = self.radius();
        match self {
            Self::Mars => Datum::new("D_MARS", "MARS", radius, radius),
            Self::Moon => Datum::new("D_MOON", "MOON", radius, radius),
        }
    }
}

impl FromStr for DatumPreset {
    type Err = Point2DemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mars" => Ok(Self::Mars),
            "moon" => Ok(Self::Moon),
            _ => Err(Point2DemError::UnknownDatumPreset(s.to_string())),
        }
    }
}

impl fmt::Display for DatumPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mars => f.write_str("mars"),
            Self::Moon => f.write_str("moon"),
        }
    }
}

/// User supplied datum selection: a preset keyword, explicit axes, or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatumRequest {
    pub preset: Option<DatumPreset>,
    pub semi_major_axis: Option<f64>,
    pub semi_minor_axis: Option<f64>,
}

impl DatumRequest {
    /// Returns `None` when no override was requested.
    pub fn resolve(&self) -> Result<Option<Datum>> {
        if let Some(preset) = self.preset {
            if self.semi_major_axis.is_some() || self.semi_minor_axis.is_some() {
                warn!("Reference spheroid '{}' overrides the datum axes", preset);
            }
            let datum = preset.datum();
            info!(
                "Re-referencing altitude values using spherical radius {} ({})",
                datum.semi_major_axis, datum.name
            );
            return Ok(Some(datum));
        }

        match (self.semi_major_axis, self.semi_minor_axis) {
            (None, None) => Ok(None),
            (Some(major), Some(minor)) => {
                if !(major > 0.0 && minor > 0.0) {
                    return Err(Point2DemError::InvalidDatum(format!(
                        "axes must be positive (semi-major {major}, semi-minor {minor})"
                    )));
                }
                if major < minor {
                    return Err(Point2DemError::InvalidDatum(format!(
                        "semi-major axis {major} is smaller than semi-minor axis {minor}"
                    )));
                }
                info!(
                    "Re-referencing altitude values to user supplied datum. Semi-major: {} Semi-minor: {}",
                    major, minor
                );
                Ok(Some(Datum::new(
                    "User Specified Datum",
                    "User Specified Spheroid",
                    major,
                    minor,
                )))
            }
            _ => Err(Point2DemError::InvalidDatum(
                "both --semi-major-axis and --semi-minor-axis are required".to_string(),
            )),
        }
    }
}
