use anyhow::Result;
use clap::Parser;
use point2dem::datum::{DatumPreset, DatumRequest};
use point2dem::projection::ProjectionRequest;
use point2dem::RunConfig;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 入力点群（X, Y, Z の 3 バンドラスタ）
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// 欠損画素の値を明示的に指定（省略時は最小の Z 値）
    #[arg(long, allow_negative_numbers = true)]
    default_value: Option<f32>,

    /// アルファチャンネル付きで出力
    #[arg(long)]
    use_alpha: bool,

    /// DEM の格子間隔（0 の場合は点密度から自動計算）
    #[arg(short = 's', long, default_value_t = 0.0)]
    dem_spacing: f64,

    /// 正規化した DEM も出力（デバッグ用）
    #[arg(short, long)]
    normalized: bool,

    /// 指定したテクスチャからオルソ画像を出力
    #[arg(long, value_name = "TEXTURE")]
    orthoimage: Option<PathBuf>,

    /// オフセットファイルも出力（デバッグ用）
    #[arg(long)]
    offset_files: bool,

    /// 出力ファイル名の接頭辞
    #[arg(short, long, default_value = "terrain")]
    output_prefix: String,

    /// DEM の出力形式（tif, img）
    #[arg(short = 't', long, default_value = "tif")]
    output_filetype: String,

    /// XYZ 座標を経度・緯度・高度に変換
    #[arg(long)]
    xyz_to_lonlat: bool,

    /// 基準天体（moon, mars）。楕円体の指定より優先
    #[arg(short = 'r', long)]
    reference_spheroid: Option<DatumPreset>,

    /// 楕円体の長半径
    #[arg(long)]
    semi_major_axis: Option<f64>,

    /// 楕円体の短半径
    #[arg(long)]
    semi_minor_axis: Option<f64>,

    /// 鉛直方向のオフセット
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    z_offset: f64,

    /// 正弦曲線図法で出力
    #[arg(long)]
    sinusoidal: bool,

    /// メルカトル図法で出力
    #[arg(long)]
    mercator: bool,

    /// 横メルカトル図法で出力
    #[arg(long)]
    transverse_mercator: bool,

    /// 正射図法で出力
    #[arg(long)]
    orthographic: bool,

    /// 平射図法で出力
    #[arg(long)]
    stereographic: bool,

    /// ランベルト正積方位図法で出力
    #[arg(long)]
    lambert_azimuthal: bool,

    /// 指定したゾーンの UTM で出力
    #[arg(long, value_name = "ZONE")]
    utm: Option<u32>,

    /// 投影中心の緯度
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    proj_lat: f64,

    /// 投影中心の経度
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    proj_lon: f64,

    /// 投影の縮尺係数
    #[arg(long, default_value_t = 1.0)]
    proj_scale: f64,

    /// 回転の軸順序
    #[arg(long, default_value = "xyz")]
    rotation_order: String,

    /// 回転角 phi（ラジアン）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    phi_rotation: f64,

    /// 回転角 omega（ラジアン）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    omega_rotation: f64,

    /// 回転角 kappa（ラジアン）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    kappa_rotation: f64,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

impl From<Args> for RunConfig {
    fn from(args: Args) -> Self {
        RunConfig {
            input: args.input,
            orthoimage: args.orthoimage,
            output_prefix: args.output_prefix,
            output_filetype: args.output_filetype,
            spacing: args.dem_spacing,
            default_value: args.default_value,
            use_alpha: args.use_alpha,
            normalized: args.normalized,
            offset_files: args.offset_files,
            xyz_to_lonlat: args.xyz_to_lonlat,
            datum: DatumRequest {
                preset: args.reference_spheroid,
                semi_major_axis: args.semi_major_axis,
                semi_minor_axis: args.semi_minor_axis,
            },
            projection: ProjectionRequest {
                sinusoidal: args.sinusoidal,
                mercator: args.mercator,
                transverse_mercator: args.transverse_mercator,
                orthographic: args.orthographic,
                stereographic: args.stereographic,
                lambert_azimuthal: args.lambert_azimuthal,
                utm_zone: args.utm,
                center_lat: args.proj_lat,
                center_lon: args.proj_lon,
                scale: args.proj_scale,
            },
            z_offset: args.z_offset,
            rotation_order: args.rotation_order,
            phi_rotation: args.phi_rotation,
            omega_rotation: args.omega_rotation,
            kappa_rotation: args.kappa_rotation,
        }
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    // スレッドプールの設定
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }

    let config = RunConfig::from(args);
    let report = point2dem::run(&config)?;

    if !report.is_success() {
        for err in &report.failed {
            error!("  {}", err);
        }
        anyhow::bail!("{} output(s) failed to write", report.failed.len());
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!(
        "Wrote {} file(s) in {:?}",
        report.written.len(),
        elapsed
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["point2dem", "cloud.tif"]).unwrap();
        let config = RunConfig::from(args);
        assert_eq!(config, RunConfig::new("cloud.tif"));
    }

    #[test]
    fn test_unknown_reference_spheroid_is_rejected() {
        let result = Args::try_parse_from(["point2dem", "cloud.tif", "-r", "europa"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_input_count() {
        assert!(Args::try_parse_from(["point2dem"]).is_err());
        assert!(Args::try_parse_from(["point2dem", "a.tif", "b.tif"]).is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = Args::try_parse_from(["point2dem", "--help"]).unwrap_err();
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_projection_and_datum_options() {
        let args = Args::try_parse_from([
            "point2dem",
            "cloud.tif",
            "--xyz-to-lonlat",
            "-r",
            "mars",
            "--stereographic",
            "--proj-lat",
            "-90",
            "--z-offset",
            "-12.5",
            "--default-value",
            "-32768",
        ])
        .unwrap();
        let config = RunConfig::from(args);
        assert!(config.xyz_to_lonlat);
        assert_eq!(config.datum.preset, Some(DatumPreset::Mars));
        assert!(config.projection.stereographic);
        assert_eq!(config.projection.center_lat, -90.0);
        assert_eq!(config.z_offset, -12.5);
        assert_eq!(config.default_value, Some(-32768.0));
    }
}
