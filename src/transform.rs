use std::str::FromStr;

use nalgebra::{Matrix3, Rotation3, Vector3};
use rayon::prelude::*;
use tracing::info;

use crate::datum::Datum;
use crate::error::{Point2DemError, Result};
use crate::point_cloud::{is_valid, PointCloud};

/// Order in which the three Euler angles are applied, e.g. "xyz".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisOrder([Axis; 3]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn unit(self) -> nalgebra::Unit<Vector3<f64>> {
        match self {
            Axis::X => Vector3::x_axis(),
            Axis::Y => Vector3::y_axis(),
            Axis::Z => Vector3::z_axis(),
        }
    }
}

impl Default for AxisOrder {
    fn default() -> Self {
        Self([Axis::X, Axis::Y, Axis::Z])
    }
}

impl FromStr for AxisOrder {
    type Err = Point2DemError;

    fn from_str(s: &str) -> Result<Self> {
        let axes: Vec<Axis> = s
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                'x' => Ok(Axis::X),
                'y' => Ok(Axis::Y),
                'z' => Ok(Axis::Z),
                _ => Err(Point2DemError::InvalidRotationOrder(s.to_string())),
            })
            .collect::<Result<_>>()?;

        match axes.as_slice() {
            &[a, b, c] => Ok(Self([a, b, c])),
            _ => Err(Point2DemError::InvalidRotationOrder(s.to_string())),
        }
    }
}

/// Euler angles (phi, omega, kappa) in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerRotation {
    pub phi: f64,
    pub omega: f64,
    pub kappa: f64,
    pub order: AxisOrder,
}

impl EulerRotation {
    pub fn is_identity(&self) -> bool {
        self.phi == 0.0 && self.omega == 0.0 && self.kappa == 0.0
    }

    /// 先頭の軸から順に回転を適用する行列
    pub fn matrix(&self) -> Matrix3<f64> {
        let angles = [self.phi, self.omega, self.kappa];
        self.order
            .0
            .iter()
            .zip(angles)
            .fold(Matrix3::identity(), |acc, (axis, angle)| {
                Rotation3::from_axis_angle(&axis.unit(), angle).into_inner() * acc
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Rotate(Matrix3<f64>),
    Offset(Vector3<f64>),
    ToGeodetic(Option<Datum>),
}

impl Step {
    fn apply(&self, p: Vector3<f64>) -> Vector3<f64> {
        match self {
            Step::Rotate(m) => m * p,
            Step::Offset(offset) => p + offset,
            Step::ToGeodetic(None) => xyz_to_lon_lat_radius(&p),
            Step::ToGeodetic(Some(datum)) => xyz_to_lon_lat_altitude(&p, datum),
        }
    }
}

/// Per-cell mapping of rotation, vertical offset and Cartesian to geodetic
/// conversion. The steps always run in that order no matter how the
/// transform was assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometricTransform {
    rotation: Option<Matrix3<f64>>,
    offset: Option<Vector3<f64>>,
    geodetic: Option<Option<Datum>>,
}

impl GeometricTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rotation(self, rotation: EulerRotation) -> Self {
        if rotation.is_identity() {
            return self;
        }
        info!(
            "Applying rotation sequence: {:?} Angles: {} {} {}",
            rotation.order, rotation.phi, rotation.omega, rotation.kappa
        );
        self.with_rotation_matrix(rotation.matrix())
    }

    pub fn with_rotation_matrix(mut self, matrix: Matrix3<f64>) -> Self {
        self.rotation = Some(matrix);
        self
    }

    pub fn with_z_offset(self, z_offset: f64) -> Self {
        if z_offset == 0.0 {
            return self;
        }
        info!("Applying z-offset: {}", z_offset);
        self.with_offset(Vector3::new(0.0, 0.0, z_offset))
    }

    pub fn with_offset(mut self, offset: Vector3<f64>) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_geodetic(mut self, datum: Option<Datum>) -> Self {
        info!("Reprojecting points into longitude, latitude, altitude");
        self.geodetic = Some(datum);
        self
    }

    pub fn converts_to_geodetic(&self) -> bool {
        self.geodetic.is_some()
    }

    fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(3);
        if let Some(m) = self.rotation {
            steps.push(Step::Rotate(m));
        }
        if let Some(offset) = self.offset {
            steps.push(Step::Offset(offset));
        }
        if let Some(datum) = &self.geodetic {
            steps.push(Step::ToGeodetic(datum.clone()));
        }
        steps
    }

    pub fn apply_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        if !is_valid(p) {
            return *p;
        }
        self.steps().iter().fold(*p, |acc, step| step.apply(acc))
    }

    /// 元の点群は変更せず新しい点群を返す
    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        let steps = self.steps();
        if steps.is_empty() {
            return cloud.clone();
        }

        let points = cloud
            .points
            .par_iter()
            .map(|p| {
                if is_valid(p) {
                    steps.iter().fold(*p, |acc, step| step.apply(acc))
                } else {
                    *p
                }
            })
            .collect();

        PointCloud::new(cloud.cols, cloud.rows, points)
    }
}

/// (経度[deg], 地心緯度[deg], 半径)
pub fn xyz_to_lon_lat_radius(p: &Vector3<f64>) -> Vector3<f64> {
    let radius = p.norm();
    let lon = p.y.atan2(p.x).to_degrees();
    let lat = p.z.atan2(p.x.hypot(p.y)).to_degrees();
    Vector3::new(lon, lat, radius)
}

/// (経度[deg], 測地緯度[deg], 楕円体高) using Bowring's method.
pub fn xyz_to_lon_lat_altitude(p: &Vector3<f64>, datum: &Datum) -> Vector3<f64> {
    let a = datum.semi_major_axis;
    let b = datum.semi_minor_axis;
    let e2 = datum.eccentricity_squared();
    let ep2 = (a * a) / (b * b) - 1.0;

    let lon = p.y.atan2(p.x);
    let r = p.x.hypot(p.y);
    let theta = (p.z * a).atan2(r * b);
    let (sin_t, cos_t) = theta.sin_cos();
    let lat = (p.z + ep2 * b * sin_t.powi(3)).atan2(r - e2 * a * cos_t.powi(3));

    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let altitude = if cos_lat.abs() > 1e-10 {
        r / cos_lat - n
    } else {
        p.z.abs() - b
    };

    Vector3::new(lon.to_degrees(), lat.to_degrees(), altitude)
}
