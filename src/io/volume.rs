use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

/// Size of the source volume, read once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeHeader {
    pub columns: u32,
    pub rows: u32,
    pub slices: u32,
}

impl VolumeHeader {
    /// Parses the output of `header -size`: columns, rows and slices separated by whitespace.
    pub fn parse_size(output: &str) -> PipelineResult<Self> {
        let fields: Vec<&str> = output.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(PipelineError::Usage(format!(
                "volume size output {:?} does not contain three dimensions",
                output.trim()
            )));
        }
        let parse = |label: &str, token: &str| -> PipelineResult<u32> {
            token.parse::<u32>().map_err(|_| {
                PipelineError::Usage(format!("volume {} {:?} is not an integer", label, token))
            })
        };
        Ok(Self {
            columns: parse("columns", fields[0])?,
            rows: parse("rows", fields[1])?,
            slices: parse("slices", fields[2])?,
        })
    }

    /// Raster dimensions as `(width, height)`, the order the image stack uses.
    pub fn raster_dims(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }
}
