use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::io::raster::read_mask;
use crate::io::VolumeHeader;
use crate::tools::{ConvertKind, ToolInvoker};

/// Foreground value of a written mask; contour extraction thresholds at this level.
pub const MASK_FOREGROUND: u8 = 255;

/// Resamples `raster` to `(width, height)` when its shape differs, otherwise returns it unchanged.
pub fn conform(raster: GrayImage, (width, height): (u32, u32)) -> GrayImage {
    if raster.dimensions() == (width, height) {
        raster
    } else {
        debug!(
            "resampling raster {:?} -> {:?}",
            raster.dimensions(),
            (width, height)
        );
        imageops::resize(&raster, width, height, FilterType::Nearest)
    }
}

/// Pixel-wise logical AND of two equally sized rasters, written as 0 / [`MASK_FOREGROUND`].
pub fn intersect(cell: &GrayImage, organelle: &GrayImage) -> PipelineResult<GrayImage> {
    if cell.dimensions() != organelle.dimensions() {
        return Err(PipelineError::Usage(format!(
            "cannot intersect rasters of different shapes {:?} and {:?}",
            cell.dimensions(),
            organelle.dimensions()
        )));
    }
    let (width, height) = cell.dimensions();
    let pixels: Vec<u8> = cell
        .as_raw()
        .par_iter()
        .zip(organelle.as_raw().par_iter())
        .map(|(&c, &o)| if c != 0 && o != 0 { MASK_FOREGROUND } else { 0 })
        .collect();

    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| PipelineError::Usage("intersection buffer has the wrong length".into()))
}

/// Builds the per-slice mask: cell boundary AND organelle segmentation at the
/// volume's native resolution.
pub struct SliceMaskBuilder {
    header: VolumeHeader,
}

impl SliceMaskBuilder {
    pub fn new(header: VolumeHeader) -> Self {
        Self { header }
    }

    /// Combines already loaded rasters. Whichever raster does not match the
    /// volume's (rows, columns) is resampled; the result always has the volume's shape.
    pub fn combine(&self, boundary: GrayImage, organelle: GrayImage) -> PipelineResult<GrayImage> {
        let dims = self.header.raster_dims();
        let boundary = conform(boundary, dims);
        let organelle = conform(organelle, dims);
        intersect(&boundary, &organelle)
    }

    /// Cuts the boundary raster for slice `z` out of the volume with the external
    /// masking tool, then combines it with the organelle raster. Intermediate
    /// files are named after `stem` and removed once read.
    pub fn build<T: ToolInvoker + ?Sized>(
        &self,
        tools: &T,
        volume: &Path,
        boundary_model: &Path,
        organelle: &Path,
        z: u32,
        stem: &Path,
    ) -> PipelineResult<GrayImage> {
        let mrc = stem.with_extension("mrc");
        let tif = stem.with_extension("tif");

        tools.mask_slice(boundary_model, volume, z, &mrc)?;
        tools.convert(ConvertKind::MrcToTif, &mrc, &tif)?;
        std::fs::remove_file(&mrc)?;

        let boundary = read_mask(&tif)?;
        std::fs::remove_file(&tif)?;
        let organelle = read_mask(organelle)?;

        self.combine(boundary, organelle)
    }
}
