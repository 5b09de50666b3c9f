use std::path::Path;

use image::{GrayImage, ImageFormat, ImageReader, Luma};

use crate::error::{PipelineError, PipelineResult};

/// Loads any supported raster as a binary 0/255 mask: every nonzero pixel is
/// foreground. The format is sniffed from the content, so the file extension
/// does not have to match.
///
/// Foreground is decided at the native bit depth. Narrowing a 16-bit 0/1 or
/// label raster to 8 bits first would turn it into all background.
pub fn read_mask<P: AsRef<Path>>(path: P) -> PipelineResult<GrayImage> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::InputNotFound {
            what: "raster",
            path: path.to_path_buf(),
        });
    }
    let raster_err = |source: image::ImageError| PipelineError::Raster {
        path: path.to_path_buf(),
        source,
    };
    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(raster_err)?;
    let wide = image.into_luma16();
    Ok(GrayImage::from_fn(wide.width(), wide.height(), |x, y| {
        if wide.get_pixel(x, y).0[0] != 0 {
            Luma([u8::MAX])
        } else {
            Luma([0])
        }
    }))
}

/// Writes a grayscale raster as TIFF, the interchange format of the toolchain.
pub fn write_tiff<P: AsRef<Path>>(path: P, image: &GrayImage) -> PipelineResult<()> {
    let path = path.as_ref();
    image
        .save_with_format(path, ImageFormat::Tiff)
        .map_err(|source| PipelineError::Raster {
            path: path.to_path_buf(),
            source,
        })
}
