pub mod model;
pub mod points;
pub mod raster;
pub mod segmentation;
pub mod volume;

pub use model::{group_contours, ModelContour, ModelSummary, ObjectSummary};
pub use points::{read_point_listing, write_point_listing, PointListingWriter, PointRow};
pub use volume::VolumeHeader;
