pub mod datum;
pub mod error;
pub mod georef;
pub mod pipeline;
pub mod point_cloud;
pub mod projection;
pub mod rasterizer;
pub mod reproject;
pub mod texture;
pub mod transform;
pub mod writer;

pub use datum::{Datum, DatumPreset, DatumRequest};
pub use error::{ErrorKind, Point2DemError, Result};
pub use georef::{GeoTransform, Georeference, PendingGeoreference};
pub use pipeline::{render, run, OutputReport, RunConfig};
pub use point_cloud::PointCloud;
pub use projection::{Projection, ProjectionRequest};
pub use rasterizer::{OrthoRasterizer, Rasterizer};
pub use writer::GeoTiffWriter;
