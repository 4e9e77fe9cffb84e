//! Run orchestration: datum, point transforms, projection, rasterization
//! and output passes, strictly in that order.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::datum::{Datum, DatumRequest};
use crate::error::{Point2DemError, Result};
use crate::georef::PendingGeoreference;
use crate::point_cloud::{PointCloud, ELEVATION_CHANNEL};
use crate::projection::{configure_georeference, Projection, ProjectionRequest};
use crate::rasterizer::{DefaultValue, OrthoRasterizer, Rasterizer};
use crate::reproject::project_point_cloud;
use crate::texture::Texture;
use crate::transform::{AxisOrder, EulerRotation, GeometricTransform};
use crate::writer::{driver_name_for, GeoTiffWriter};

/// Everything a run needs, independent of how it was parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub orthoimage: Option<PathBuf>,
    pub output_prefix: String,
    pub output_filetype: String,
    pub spacing: f64,
    pub default_value: Option<f32>,
    pub use_alpha: bool,
    pub normalized: bool,
    pub offset_files: bool,
    pub xyz_to_lonlat: bool,
    pub datum: DatumRequest,
    pub projection: ProjectionRequest,
    pub z_offset: f64,
    pub rotation_order: String,
    pub phi_rotation: f64,
    pub omega_rotation: f64,
    pub kappa_rotation: f64,
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            orthoimage: None,
            output_prefix: "terrain".to_string(),
            output_filetype: "tif".to_string(),
            spacing: 0.0,
            default_value: None,
            use_alpha: false,
            normalized: false,
            offset_files: false,
            xyz_to_lonlat: false,
            datum: DatumRequest::default(),
            projection: ProjectionRequest::default(),
            z_offset: 0.0,
            rotation_order: "xyz".to_string(),
            phi_rotation: 0.0,
            omega_rotation: 0.0,
            kappa_rotation: 0.0,
        }
    }

    pub fn default_value_policy(&self) -> DefaultValue {
        match self.default_value {
            Some(value) => DefaultValue::Explicit(value),
            None => DefaultValue::MinZ,
        }
    }

    pub fn output_paths(&self) -> OutputPaths {
        OutputPaths::new(&self.output_prefix, &self.output_filetype)
    }

    pub fn planned_passes(&self) -> Vec<OutputPass> {
        if self.orthoimage.is_some() {
            vec![OutputPass::Orthoimage]
        } else if self.normalized {
            vec![OutputPass::Dem, OutputPass::NormalizedDem]
        } else {
            vec![OutputPass::Dem]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPass {
    Dem,
    NormalizedDem,
    Orthoimage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dem: PathBuf,
    pub normalized_dem: PathBuf,
    pub orthoimage: PathBuf,
    pub orthoimage_offset: PathBuf,
    pub normalized_offset: PathBuf,
}

impl OutputPaths {
    pub fn new(prefix: &str, filetype: &str) -> Self {
        Self {
            dem: PathBuf::from(format!("{prefix}-DEM.{filetype}")),
            normalized_dem: PathBuf::from(format!("{prefix}-DEM-normalized.tif")),
            orthoimage: PathBuf::from(format!("{prefix}-DRG.tif")),
            orthoimage_offset: PathBuf::from(format!("{prefix}-DRG.offset")),
            normalized_offset: PathBuf::from(format!("{prefix}-DEM-normalized.offset")),
        }
    }
}

/// Per-artifact outcome. A failed artifact never blocks the others.
#[derive(Debug, Default)]
pub struct OutputReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<Point2DemError>,
}

impl OutputReport {
    fn record(&mut self, path: &Path, result: anyhow::Result<()>) -> bool {
        match result {
            Ok(()) => {
                info!("Written: {:?}", path);
                self.written.push(path.to_path_buf());
                true
            }
            Err(e) => {
                error!("Failed to write {:?}: {:#}", path, e);
                self.failed.push(Point2DemError::Output {
                    path: path.to_path_buf(),
                    message: format!("{e:#}"),
                });
                false
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Geometry prepared for rasterization.
pub struct Prepared {
    pub cloud: PointCloud,
    pub georef: PendingGeoreference,
}

struct Validated {
    datum: Option<Datum>,
    projection: Option<Projection>,
    transform: GeometricTransform,
}

/// 設定の検証のみ。点群には触れない
fn validate(config: &RunConfig) -> Result<Validated> {
    if config.spacing < 0.0 || config.spacing.is_nan() {
        return Err(Point2DemError::InvalidSpacing(config.spacing));
    }
    driver_name_for(&config.output_filetype)?;

    let datum = config.datum.resolve()?;
    let projection = config.projection.resolve()?;
    let rotation = EulerRotation {
        phi: config.phi_rotation,
        omega: config.omega_rotation,
        kappa: config.kappa_rotation,
        order: config.rotation_order.parse::<AxisOrder>()?,
    };

    let mut transform = GeometricTransform::new()
        .with_rotation(rotation)
        .with_z_offset(config.z_offset);
    if config.xyz_to_lonlat {
        transform = transform.with_geodetic(datum.clone());
    }

    Ok(Validated {
        datum,
        projection,
        transform,
    })
}

fn prepare_validated(validated: Validated, cloud: &PointCloud) -> Result<Prepared> {
    let Validated {
        datum,
        projection,
        transform,
    } = validated;
    let geodetic = transform.converts_to_geodetic();

    let cloud = transform.apply(cloud);
    let georef = configure_georeference(projection, datum, geodetic);

    let cloud = if geodetic {
        project_point_cloud(&cloud, &georef)?
    } else {
        cloud
    };

    Ok(Prepared { cloud, georef })
}

/// Resolves the datum, transforms the points and, for geodetic data,
/// projects them into the map plane.
pub fn prepare(config: &RunConfig, cloud: &PointCloud) -> Result<Prepared> {
    prepare_validated(validate(config)?, cloud)
}

/// Drives the rasterizer through the output passes. Fatal errors (empty
/// cloud, unreadable texture) surface before anything is written.
pub fn render<R: Rasterizer>(
    rasterizer: &mut R,
    georef: PendingGeoreference,
    config: &RunConfig,
    writer: &GeoTiffWriter,
) -> Result<OutputReport> {
    rasterizer.set_default_value(config.default_value_policy());
    rasterizer.set_use_alpha(config.use_alpha);

    let bbox = rasterizer.bounding_box()?;
    let transform = rasterizer.geo_transform()?;
    info!("Georeferencing transform: {:?}", transform);
    let georef = georef.finalize(transform);
    let spacing = rasterizer.spacing()?;
    let (cols, rows) = rasterizer.dimensions()?;
    let upper_left = georef.pixel_to_point(0.0, 0.0);
    let lower_right = georef.pixel_to_point(cols as f64, rows as f64);
    info!("Raster covers {:?} - {:?}", upper_left, lower_right);

    let paths = config.output_paths();
    let mut report = OutputReport::default();

    let mut dem_written = false;
    for pass in config.planned_passes() {
        match pass {
            OutputPass::Orthoimage => {
                // 標高由来の既定値がテクスチャに混ざらないようにする
                let default_value = rasterizer.policy().default_value.without_min();
                rasterizer.set_default_value(default_value);
                if let Some(texture_path) = &config.orthoimage {
                    rasterizer.set_texture(Texture::open(texture_path)?)?;
                }

                let grid = rasterizer.rasterize()?;
                let result = writer.write_orthoimage(&grid, &georef, &paths.orthoimage);
                report.record(&paths.orthoimage, result);
            }
            OutputPass::Dem => {
                let grid = rasterizer.rasterize()?;
                let nodata = rasterizer.policy().default_value.explicit().map(f64::from);
                let result = writer.write_dem(&grid, &georef, &paths.dem, nodata);
                dem_written = report.record(&paths.dem, result);
            }
            OutputPass::NormalizedDem => {
                let result = if dem_written {
                    writer.write_normalized_dem(&paths.dem, &georef, &paths.normalized_dem)
                } else {
                    Err(anyhow::anyhow!("DEM pass failed, nothing to normalize"))
                };
                report.record(&paths.normalized_dem, result);
            }
        }
    }

    if config.offset_files {
        let offset = bbox.pixel_offset(spacing);
        info!("Offset: {} {}", offset.0, offset.1);
        for path in [&paths.orthoimage_offset, &paths.normalized_offset] {
            let result = writer.write_offset_file(path, offset);
            report.record(path, result);
        }
    }

    Ok(report)
}

/// Full run from files on disk.
pub fn run(config: &RunConfig) -> Result<OutputReport> {
    // 点群を読む前に設定エラーを検出する
    let validated = validate(config)?;

    let cloud = PointCloud::open(&config.input)?;
    let Prepared { cloud, georef } = prepare_validated(validated, &cloud)?;

    let mut rasterizer = OrthoRasterizer::new(cloud, ELEVATION_CHANNEL, config.spacing);
    render(&mut rasterizer, georef, config, &GeoTiffWriter::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DatumPreset;
    use crate::rasterizer::RasterizationPolicy;
    use nalgebra::Vector3;

    fn flat_cloud() -> PointCloud {
        PointCloud::new(
            2,
            2,
            vec![
                Vector3::new(0.0, 10.0, 1.0),
                Vector3::new(10.0, 10.0, 2.0),
                Vector3::new(0.0, 0.0, 3.0),
                Vector3::zeros(),
            ],
        )
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::new("out/run", "img");
        assert_eq!(paths.dem, PathBuf::from("out/run-DEM.img"));
        assert_eq!(paths.normalized_dem, PathBuf::from("out/run-DEM-normalized.tif"));
        assert_eq!(paths.orthoimage, PathBuf::from("out/run-DRG.tif"));
        assert_eq!(paths.orthoimage_offset, PathBuf::from("out/run-DRG.offset"));
        assert_eq!(
            paths.normalized_offset,
            PathBuf::from("out/run-DEM-normalized.offset")
        );
    }

    #[test]
    fn test_orthoimage_is_the_only_pass() {
        let mut config = RunConfig::new("cloud.tif");
        config.normalized = true;
        assert_eq!(
            config.planned_passes(),
            vec![OutputPass::Dem, OutputPass::NormalizedDem]
        );

        config.orthoimage = Some(PathBuf::from("texture.tif"));
        assert_eq!(config.planned_passes(), vec![OutputPass::Orthoimage]);
    }

    #[test]
    fn test_default_value_policy() {
        let mut config = RunConfig::new("cloud.tif");
        assert_eq!(config.default_value_policy(), DefaultValue::MinZ);
        config.default_value = Some(-1.0);
        assert_eq!(config.default_value_policy(), DefaultValue::Explicit(-1.0));
    }

    #[test]
    fn test_prepare_cartesian_keeps_points() {
        let config = RunConfig::new("cloud.tif");
        let prepared = prepare(&config, &flat_cloud()).unwrap();
        assert_eq!(prepared.cloud, flat_cloud());
        assert_eq!(*prepared.georef.projection(), Projection::cartesian_default());
    }

    #[test]
    fn test_prepare_applies_offset() {
        let mut config = RunConfig::new("cloud.tif");
        config.z_offset = 5.0;
        let prepared = prepare(&config, &flat_cloud()).unwrap();
        assert_eq!(prepared.cloud.points[0].z, 6.0);
        assert_eq!(prepared.cloud.points[3], Vector3::zeros());
    }

    #[test]
    fn test_configuration_errors() {
        let mut config = RunConfig::new("cloud.tif");
        config.rotation_order = "abc".to_string();
        assert!(matches!(
            prepare(&config, &flat_cloud()),
            Err(Point2DemError::InvalidRotationOrder(_))
        ));

        let mut config = RunConfig::new("cloud.tif");
        config.spacing = -1.0;
        assert!(matches!(
            prepare(&config, &flat_cloud()),
            Err(Point2DemError::InvalidSpacing(_))
        ));

        let mut config = RunConfig::new("cloud.tif");
        config.output_filetype = "png".to_string();
        assert!(prepare(&config, &flat_cloud()).is_err());
    }

    #[test]
    fn test_run_rejects_bad_config_before_reading() {
        let mut config = RunConfig::new("/nonexistent/cloud.tif");
        config.projection.utm_zone = Some(99);
        config.xyz_to_lonlat = true;
        assert!(matches!(
            run(&config),
            Err(Point2DemError::InvalidProjection(_))
        ));

        let mut config = RunConfig::new("/nonexistent/cloud.tif");
        config.datum.semi_major_axis = Some(10.0);
        assert!(matches!(run(&config), Err(Point2DemError::InvalidDatum(_))));
    }

    #[test]
    fn test_prepare_geodetic_sphere() {
        let radius = DatumPreset::Moon.radius();
        let cloud = PointCloud::new(
            2,
            1,
            vec![Vector3::new(radius + 20.0, 0.0, 0.0), Vector3::zeros()],
        );
        let mut config = RunConfig::new("cloud.tif");
        config.xyz_to_lonlat = true;
        config.datum.preset = Some(DatumPreset::Moon);

        let prepared = prepare(&config, &cloud).unwrap();
        assert!(prepared.georef.projection().is_geographic());
        let p = prepared.cloud.points[0];
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
        assert!((p.z - 20.0).abs() < 1e-6);
        assert_eq!(prepared.cloud.points[1], Vector3::zeros());
    }

    #[test]
    fn test_render_empty_cloud_writes_nothing() {
        let cloud = PointCloud::new(2, 1, vec![Vector3::zeros(); 2]);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = RunConfig::new("cloud.tif");
        config.output_prefix = temp_dir.path().join("empty").display().to_string();
        config.offset_files = true;

        let prepared = prepare(&config, &cloud).unwrap();
        let mut rasterizer = OrthoRasterizer::new(prepared.cloud, ELEVATION_CHANNEL, 0.0);
        let result = render(&mut rasterizer, prepared.georef, &config, &GeoTiffWriter::new());
        assert!(matches!(result, Err(Point2DemError::EmptyPointCloud)));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_render_orthoimage_overrides_min_z() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = RunConfig::new("cloud.tif");
        config.output_prefix = temp_dir.path().join("ortho").display().to_string();
        // テクスチャが存在しないため書き出し前に失敗するが、方針は変更済み
        config.orthoimage = Some(temp_dir.path().join("missing-texture.tif"));

        let prepared = prepare(&config, &flat_cloud()).unwrap();
        let mut rasterizer = OrthoRasterizer::new(prepared.cloud, ELEVATION_CHANNEL, 0.0);
        let result = render(&mut rasterizer, prepared.georef, &config, &GeoTiffWriter::new());
        assert!(result.is_err());
        assert_eq!(
            rasterizer.policy(),
            RasterizationPolicy {
                default_value: DefaultValue::Explicit(0.0),
                use_alpha: false,
            }
        );
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
