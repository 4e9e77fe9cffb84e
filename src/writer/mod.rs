use anyhow::{Context, Result};
use gdal::raster::{Buffer, ColorInterpretation, GdalType};
use gdal::{Dataset, DriverManager, Metadata};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Point2DemError;
use crate::georef::Georeference;
use crate::rasterizer::RasterGrid;

/// 出力ファイル拡張子に対応する GDAL ドライバー名
pub fn driver_name_for(filetype: &str) -> crate::error::Result<&'static str> {
    match filetype.to_ascii_lowercase().as_str() {
        "tif" | "tiff" => Ok("GTiff"),
        "img" => Ok("HFA"),
        _ => Err(Point2DemError::UnsupportedFileType(filetype.to_string())),
    }
}

fn driver_name_for_path(path: &Path) -> Result<&'static str> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("tif");
    Ok(driver_name_for(ext)?)
}

/// 0..1 の値を 8bit に変換
fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * u8::MAX as f32).round() as u8
}

#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Float32 の DEM。明示的な既定値は NoData として記録する
    pub fn write_dem(
        &self,
        grid: &RasterGrid,
        georef: &Georeference,
        output_path: &Path,
        nodata: Option<f64>,
    ) -> Result<()> {
        tracing::info!(
            "Writing DEM: {} x {} pixels to {:?}",
            grid.cols,
            grid.rows,
            output_path
        );

        let alpha = grid
            .alpha
            .as_ref()
            .map(|a| a.iter().map(|&v| f32::from(v)).collect::<Vec<f32>>());

        let mut dataset = self.create::<f32>(output_path, grid.cols, grid.rows, alpha.is_some())?;
        self.set_geo_metadata(&mut dataset, georef)?;

        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
        if let Some(nodata) = nodata {
            band.set_no_data_value(Some(nodata))
                .context("Failed to set no data value")?;
        }
        let mut buffer = Buffer::new((grid.cols, grid.rows), grid.values.clone());
        band.write((0, 0), (grid.cols, grid.rows), &mut buffer)
            .context("Failed to write raster data")?;

        if let Some(alpha) = alpha {
            self.write_alpha_band(&mut dataset, 2, grid.cols, grid.rows, alpha)?;
        }

        dataset
            .set_metadata_item("PRODUCT", "DEM", "")
            .context("Failed to set product metadata")?;

        Ok(())
    }

    /// 書き出し済みの DEM を読み直し、有効範囲を 0..255 に伸張する
    pub fn write_normalized_dem(
        &self,
        dem_path: &Path,
        georef: &Georeference,
        output_path: &Path,
    ) -> Result<()> {
        tracing::info!("Writing normalized DEM: {:?}", output_path);

        let dem = Dataset::open(dem_path).context("Failed to reopen DEM")?;
        let (cols, rows) = dem.raster_size();
        let band = dem.rasterband(1).context("Failed to get raster band")?;
        let nodata = band.no_data_value();
        let (_, values) = band
            .read_band_as::<f32>()
            .context("Failed to read DEM values")?
            .into_shape_and_vec();

        let is_data = |v: f32| v.is_finite() && nodata.map_or(true, |nd| f64::from(v) != nd);
        let (min, max) = values
            .iter()
            .copied()
            .filter(|&v| is_data(v))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let range = if max > min { max - min } else { 1.0 };

        let normalized: Vec<u8> = values
            .iter()
            .map(|&v| if is_data(v) { to_u8((v - min) / range) } else { 0 })
            .collect();

        let alpha = if (dem.raster_count() as usize) > 1 {
            let (_, alpha) = dem
                .rasterband(2)
                .context("Failed to get alpha band")?
                .read_band_as::<u8>()
                .context("Failed to read alpha band")?
                .into_shape_and_vec();
            Some(alpha)
        } else {
            None
        };

        let mut dataset = self.create::<u8>(output_path, cols, rows, alpha.is_some())?;
        self.set_geo_metadata(&mut dataset, georef)?;
        self.write_band(&mut dataset, 1, cols, rows, normalized)?;
        if let Some(alpha) = alpha {
            self.write_alpha_band(&mut dataset, 2, cols, rows, alpha)?;
        }

        Ok(())
    }

    /// テクスチャ (0..1) を 8bit のオルソ画像として書き出す
    pub fn write_orthoimage(
        &self,
        grid: &RasterGrid,
        georef: &Georeference,
        output_path: &Path,
    ) -> Result<()> {
        tracing::info!(
            "Writing orthoimage: {} x {} pixels to {:?}",
            grid.cols,
            grid.rows,
            output_path
        );

        let gray: Vec<u8> = grid.values.iter().map(|&v| to_u8(v)).collect();

        let mut dataset =
            self.create::<u8>(output_path, grid.cols, grid.rows, grid.alpha.is_some())?;
        self.set_geo_metadata(&mut dataset, georef)?;
        self.write_band(&mut dataset, 1, grid.cols, grid.rows, gray)?;
        if let Some(alpha) = &grid.alpha {
            self.write_alpha_band(&mut dataset, 2, grid.cols, grid.rows, alpha.clone())?;
        }

        dataset
            .set_metadata_item("PRODUCT", "DRG", "")
            .context("Failed to set product metadata")?;

        Ok(())
    }

    /// 2 行の整数テキスト（水平・垂直オフセット）
    pub fn write_offset_file(&self, output_path: &Path, offset: (i32, i32)) -> Result<()> {
        let mut file = File::create(output_path)
            .with_context(|| format!("Failed to open offset file {:?}", output_path))?;
        writeln!(file, "{}\n{}", offset.0, offset.1)
            .with_context(|| format!("Failed to write offset file {:?}", output_path))?;
        Ok(())
    }

    fn create<T: GdalType + Copy>(
        &self,
        output_path: &Path,
        cols: usize,
        rows: usize,
        with_alpha: bool,
    ) -> Result<Dataset> {
        let driver_name = driver_name_for_path(output_path)?;
        let driver = DriverManager::get_driver_by_name(driver_name)
            .with_context(|| format!("Failed to get {} driver", driver_name))?;

        let bands = if with_alpha { 2 } else { 1 };
        driver
            .create_with_band_type::<T, _>(output_path, cols, rows, bands)
            .context("Failed to create dataset")
    }

    fn set_geo_metadata(&self, dataset: &mut Dataset, georef: &Georeference) -> Result<()> {
        // ジオトランスフォームを設定
        dataset
            .set_geo_transform(georef.transform())
            .context("Failed to set geo transform")?;

        // 座標系を設定
        let wkt = georef
            .to_wkt()
            .context("Failed to convert georeference to WKT")?;
        dataset
            .set_projection(&wkt)
            .context("Failed to set projection")?;

        dataset
            .set_metadata_item("DATUM", &georef.datum().name, "")
            .context("Failed to set datum metadata")?;

        Ok(())
    }

    fn write_band<T: GdalType + Copy>(
        &self,
        dataset: &mut Dataset,
        index: usize,
        cols: usize,
        rows: usize,
        values: Vec<T>,
    ) -> Result<()> {
        let mut band = dataset
            .rasterband(index)
            .with_context(|| format!("Failed to get raster band {}", index))?;
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer)
            .with_context(|| format!("Failed to write band {}", index))?;
        Ok(())
    }

    fn write_alpha_band<T: GdalType + Copy>(
        &self,
        dataset: &mut Dataset,
        index: usize,
        cols: usize,
        rows: usize,
        values: Vec<T>,
    ) -> Result<()> {
        self.write_band(dataset, index, cols, rows, values)?;
        let mut band = dataset
            .rasterband(index)
            .with_context(|| format!("Failed to get raster band {}", index))?;
        band.set_color_interpretation(ColorInterpretation::AlphaBand)
            .context("Failed to mark alpha band")?;
        Ok(())
    }
}
