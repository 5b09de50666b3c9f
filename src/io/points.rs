use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

/// One line of a point listing: `<object> <contour> <x> <y> <z>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointRow {
    pub object: u32,
    pub contour: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PointRow {
    fn parse_line(line: &str, path: &Path, line_no: usize) -> PipelineResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let bad = |reason: String| PipelineError::PointListing {
            path: path.to_path_buf(),
            line: line_no,
            reason,
        };
        if fields.len() != 5 {
            return Err(bad(format!("expected 5 fields, found {}", fields.len())));
        }
        let id = |token: &str| {
            token
                .parse::<u32>()
                .map_err(|_| bad(format!("{:?} is not an object/contour id", token)))
        };
        let coord = |token: &str| {
            token
                .parse::<f64>()
                .map_err(|_| bad(format!("{:?} is not a coordinate", token)))
        };
        Ok(Self {
            object: id(fields[0])?,
            contour: id(fields[1])?,
            x: coord(fields[2])?,
            y: coord(fields[3])?,
            z: coord(fields[4])?,
        })
    }
}

/// Reads a point listing as the toolchain writes it. Columns may be padded with
/// any amount of whitespace; blank lines are ignored. An empty file is an empty listing.
pub fn read_point_listing<P: AsRef<Path>>(path: P) -> PipelineResult<Vec<PointRow>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(PointRow::parse_line(&line, path, i + 1)?);
    }
    Ok(rows)
}

/// Space-delimited writer producing `"<object> <contour> <x> <y> <z>\n"` lines.
pub struct PointListingWriter {
    path: PathBuf,
    inner: csv::Writer<File>,
    rows_written: usize,
}

impl PointListingWriter {
    /// Opens `path` for appending, creating it when absent.
    pub fn append<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self::from_file(path, file))
    }

    /// Truncates or creates `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self::from_file(path, file))
    }

    fn from_file(path: PathBuf, file: File) -> Self {
        let inner = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        Self {
            path,
            inner,
            rows_written: 0,
        }
    }

    pub fn write_row(&mut self, row: &PointRow) -> PipelineResult<()> {
        self.inner
            .serialize(row)
            .map_err(|e| PipelineError::PointListing {
                path: self.path.clone(),
                line: self.rows_written + 1,
                reason: e.to_string(),
            })?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> PipelineResult<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Writes `rows` to `path`, replacing any previous content.
pub fn write_point_listing<P: AsRef<Path>>(path: P, rows: &[PointRow]) -> PipelineResult<()> {
    let mut writer = PointListingWriter::create(path)?;
    for row in rows {
        writer.write_row(row)?;
    }
    writer.flush()
}
