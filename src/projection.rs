use tracing::{info, warn};

use crate::datum::Datum;
use crate::error::{Point2DemError, Result};
use crate::georef::PendingGeoreference;

/// Map projection applied to the geodetic points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Geographic,
    Sinusoidal {
        center_lon: f64,
    },
    Mercator {
        center_lat: f64,
        center_lon: f64,
        scale: f64,
    },
    TransverseMercator {
        center_lat: f64,
        center_lon: f64,
        scale: f64,
    },
    Orthographic {
        center_lat: f64,
        center_lon: f64,
    },
    Stereographic {
        center_lat: f64,
        center_lon: f64,
        scale: f64,
    },
    LambertAzimuthal {
        center_lat: f64,
        center_lon: f64,
    },
    Utm {
        zone: u32,
    },
}

impl Projection {
    /// 直交座標のまま出力する場合の既定値 (Mercator, 原点, 縮尺 1)
    pub fn cartesian_default() -> Self {
        Self::Mercator {
            center_lat: 0.0,
            center_lon: 0.0,
            scale: 1.0,
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Utm { zone } if !(1..=60).contains(&zone) => Err(
                Point2DemError::InvalidProjection(format!("UTM zone {zone} is outside 1..=60")),
            ),
            Self::Mercator { scale, .. }
            | Self::TransverseMercator { scale, .. }
            | Self::Stereographic { scale, .. }
                if !(scale > 0.0) =>
            {
                Err(Point2DemError::InvalidProjection(format!(
                    "projection scale must be positive, got {scale}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// PROJ 形式の投影定義（楕円体パラメータは含まない）
    pub fn proj4(&self) -> String {
        match *self {
            Self::Geographic => "+proj=longlat".to_string(),
            Self::Sinusoidal { center_lon } => format!("+proj=sinu +lon_0={center_lon}"),
            Self::Mercator {
                center_lat,
                center_lon,
                scale,
            } => {
                if center_lat != 0.0 {
                    format!("+proj=merc +lat_ts={center_lat} +lon_0={center_lon}")
                } else {
                    format!("+proj=merc +lon_0={center_lon} +k={scale}")
                }
            }
            Self::TransverseMercator {
                center_lat,
                center_lon,
                scale,
            } => format!("+proj=tmerc +lat_0={center_lat} +lon_0={center_lon} +k={scale}"),
            Self::Orthographic {
                center_lat,
                center_lon,
            } => format!("+proj=ortho +lat_0={center_lat} +lon_0={center_lon}"),
            Self::Stereographic {
                center_lat,
                center_lon,
                scale,
            } => format!("+proj=stere +lat_0={center_lat} +lon_0={center_lon} +k={scale}"),
            Self::LambertAzimuthal {
                center_lat,
                center_lon,
            } => format!("+proj=laea +lat_0={center_lat} +lon_0={center_lon}"),
            Self::Utm { zone } => format!("+proj=utm +zone={zone}"),
        }
    }
}

/// Projection options as they arrive from the command line. More than one
/// flag may be set; [`ProjectionRequest::resolve`] picks the first in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRequest {
    pub sinusoidal: bool,
    pub mercator: bool,
    pub transverse_mercator: bool,
    pub orthographic: bool,
    pub stereographic: bool,
    pub lambert_azimuthal: bool,
    pub utm_zone: Option<u32>,
    pub center_lat: f64,
    pub center_lon: f64,
    pub scale: f64,
}

impl Default for ProjectionRequest {
    fn default() -> Self {
        Self {
            sinusoidal: false,
            mercator: false,
            transverse_mercator: false,
            orthographic: false,
            stereographic: false,
            lambert_azimuthal: false,
            utm_zone: None,
            center_lat: 0.0,
            center_lon: 0.0,
            scale: 1.0,
        }
    }
}

impl ProjectionRequest {
    /// Priority: sinusoidal, mercator, transverse-mercator, orthographic,
    /// stereographic, lambert-azimuthal, utm. `None` when nothing was asked for.
    pub fn resolve(&self) -> Result<Option<Projection>> {
        let (center_lat, center_lon, scale) = (self.center_lat, self.center_lon, self.scale);
        let candidates = [
            (self.sinusoidal, Projection::Sinusoidal { center_lon }),
            (
                self.mercator,
                Projection::Mercator {
                    center_lat,
                    center_lon,
                    scale,
                },
            ),
            (
                self.transverse_mercator,
                Projection::TransverseMercator {
                    center_lat,
                    center_lon,
                    scale,
                },
            ),
            (
                self.orthographic,
                Projection::Orthographic {
                    center_lat,
                    center_lon,
                },
            ),
            (
                self.stereographic,
                Projection::Stereographic {
                    center_lat,
                    center_lon,
                    scale,
                },
            ),
            (
                self.lambert_azimuthal,
                Projection::LambertAzimuthal {
                    center_lat,
                    center_lon,
                },
            ),
            (
                self.utm_zone.is_some(),
                Projection::Utm {
                    zone: self.utm_zone.unwrap_or_default(),
                },
            ),
        ];

        let mut selected = candidates.into_iter().filter(|(set, _)| *set).map(|(_, p)| p);
        let Some(projection) = selected.next() else {
            return Ok(None);
        };
        let ignored = selected.count();
        if ignored > 0 {
            warn!(
                "{} additional projection option(s) ignored, using {}",
                ignored,
                projection.proj4()
            );
        }

        projection.validate()?;
        Ok(Some(projection))
    }
}

/// Builds the georeference for this run, leaving the affine transform unset.
/// Data that stays Cartesian always gets the planar Mercator convention.
pub fn configure_georeference(
    requested: Option<Projection>,
    datum: Option<Datum>,
    geodetic: bool,
) -> PendingGeoreference {
    let projection = if geodetic {
        requested.unwrap_or(Projection::Geographic)
    } else {
        if requested.is_some() {
            warn!("Projection options require --xyz-to-lonlat and are ignored");
        }
        Projection::cartesian_default()
    };

    info!("Using projection: {}", projection.proj4());
    PendingGeoreference::new(datum.unwrap_or_default(), projection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_requested() {
        assert_eq!(ProjectionRequest::default().resolve().unwrap(), None);
    }

    #[test]
    fn test_first_listed_wins() {
        let request = ProjectionRequest {
            stereographic: true,
            mercator: true,
            utm_zone: Some(10),
            center_lat: 12.0,
            center_lon: 34.0,
            scale: 0.5,
            ..Default::default()
        };
        assert_eq!(
            request.resolve().unwrap(),
            Some(Projection::Mercator {
                center_lat: 12.0,
                center_lon: 34.0,
                scale: 0.5
            })
        );

        let request = ProjectionRequest {
            lambert_azimuthal: true,
            utm_zone: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve().unwrap(),
            Some(Projection::LambertAzimuthal { .. })
        ));
    }

    #[test]
    fn test_utm_zone_validation() {
        let request = ProjectionRequest {
            utm_zone: Some(61),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(),
            Err(Point2DemError::InvalidProjection(_))
        ));

        let request = ProjectionRequest {
            utm_zone: Some(33),
            ..Default::default()
        };
        assert_eq!(request.resolve().unwrap(), Some(Projection::Utm { zone: 33 }));
    }

    #[test]
    fn test_scale_validation() {
        let request = ProjectionRequest {
            transverse_mercator: true,
            scale: 0.0,
            ..Default::default()
        };
        assert!(request.resolve().is_err());
    }

    #[test]
    fn test_proj4_strings() {
        assert_eq!(
            Projection::Sinusoidal { center_lon: 137.5 }.proj4(),
            "+proj=sinu +lon_0=137.5"
        );
        assert_eq!(
            Projection::cartesian_default().proj4(),
            "+proj=merc +lon_0=0 +k=1"
        );
        assert_eq!(Projection::Utm { zone: 54 }.proj4(), "+proj=utm +zone=54");
        assert_eq!(Projection::Geographic.proj4(), "+proj=longlat");
    }

    #[test]
    fn test_cartesian_data_gets_mercator() {
        let pending = configure_georeference(
            Some(Projection::Sinusoidal { center_lon: 0.0 }),
            None,
            false,
        );
        assert_eq!(*pending.projection(), Projection::cartesian_default());
        assert_eq!(*pending.datum(), Datum::wgs84());
    }

    #[test]
    fn test_geodetic_data_honours_request() {
        let pending = configure_georeference(
            Some(Projection::Orthographic {
                center_lat: 10.0,
                center_lon: 20.0,
            }),
            Some(crate::datum::DatumPreset::Moon.datum()),
            true,
        );
        assert!(matches!(pending.projection(), Projection::Orthographic { .. }));
        assert_eq!(pending.datum().name, "D_MOON");

        let pending = configure_georeference(None, None, true);
        assert!(pending.projection().is_geographic());
    }
}
