use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::io::{PointListingWriter, PointRow};

/// Object id every accumulated row is written with.
pub const GLOBAL_OBJECT_ID: u32 = 1;

/// Running contour-id base. Global id = local id + offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ContourOffset(pub u32);

/// Contours extracted from one slice, numbered locally from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceListing {
    pub z: u32,
    pub rows: Vec<PointRow>,
    /// Number of local contours reported by the extractor.
    pub contour_count: u32,
}

impl SliceListing {
    /// The local count is the id of the last contour, as extraction numbers contours consecutively.
    pub fn from_rows(z: u32, rows: Vec<PointRow>) -> Self {
        let contour_count = rows.last().map(|r| r.contour).unwrap_or(0);
        Self {
            z,
            rows,
            contour_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A slice-local listing uses ids in `1..=contour_count` and reaches `contour_count`.
    /// Anything else has already been offset, or was truncated.
    fn check_local(&self) -> PipelineResult<()> {
        if self.rows.is_empty() {
            if self.contour_count != 0 {
                return Err(PipelineError::Accumulation(format!(
                    "slice {} reports {} contours but has no points",
                    self.z, self.contour_count
                )));
            }
            return Ok(());
        }
        let min = self.rows.iter().map(|r| r.contour).min().unwrap_or(0);
        let max = self.rows.iter().map(|r| r.contour).max().unwrap_or(0);
        if min != 1 || max != self.contour_count {
            return Err(PipelineError::Usage(format!(
                "slice {} has contour ids {}..={} but {} local contours; \
                 the listing is not numbered from 1 (already offset?)",
                self.z, min, max, self.contour_count
            )));
        }
        Ok(())
    }
}

/// Rows moved into the global id space, and the offset for the next slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Rebased {
    pub rows: Vec<PointRow>,
    pub next: ContourOffset,
}

/// Re-bases `listing` onto `offset`, preserving row order. Empty slices
/// consume no ids.
pub fn rebase(listing: &SliceListing, offset: ContourOffset) -> PipelineResult<Rebased> {
    listing.check_local()?;
    let rows = listing
        .rows
        .iter()
        .map(|r| PointRow {
            object: GLOBAL_OBJECT_ID,
            contour: r.contour + offset.0,
            ..*r
        })
        .collect();
    Ok(Rebased {
        rows,
        next: ContourOffset(offset.0 + listing.contour_count),
    })
}

/// The finished accumulation file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalListing {
    pub path: PathBuf,
    pub contours: u32,
    pub rows: usize,
}

/// Appends re-based slice listings to one point listing. Single pass: each
/// slice is absorbed once, in slice order.
pub struct ContourAccumulator {
    writer: PointListingWriter,
    offset: ContourOffset,
    last_z: Option<u32>,
}

impl ContourAccumulator {
    /// Starts a fresh listing at `path`. An existing file is refused, so a
    /// listing is never extended by a second run.
    pub fn create<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(PipelineError::Usage(format!(
                "accumulation target {} already exists",
                path.display()
            )));
        }
        Ok(Self {
            writer: PointListingWriter::append(path)?,
            offset: ContourOffset::default(),
            last_z: None,
        })
    }

    pub fn offset(&self) -> ContourOffset {
        self.offset
    }

    /// Appends one slice and returns the new offset.
    pub fn absorb(&mut self, listing: &SliceListing) -> PipelineResult<ContourOffset> {
        if let Some(last) = self.last_z {
            if listing.z <= last {
                return Err(PipelineError::Accumulation(format!(
                    "slice {} absorbed after slice {}",
                    listing.z, last
                )));
            }
        }
        let rebased = rebase(listing, self.offset)?;
        for row in &rebased.rows {
            self.writer.write_row(row)?;
        }
        self.last_z = Some(listing.z);
        self.offset = rebased.next;

        info!(
            "z = {}: {} contours, {} total",
            listing.z, listing.contour_count, self.offset.0
        );
        Ok(self.offset)
    }

    pub fn finish(mut self) -> PipelineResult<GlobalListing> {
        self.writer.flush()?;
        Ok(GlobalListing {
            path: self.writer.path().to_path_buf(),
            contours: self.offset.0,
            rows: self.writer.rows_written(),
        })
    }
}
