use std::cell::RefCell;
use std::path::Path;

use image::{GrayImage, Luma};

use crate::config::Color;
use crate::error::{PipelineError, PipelineResult};
use crate::io::raster::{read_mask, write_tiff};
use crate::io::{read_point_listing, write_point_listing, ModelSummary, PointRow, VolumeHeader};
use crate::processing::mask::MASK_FOREGROUND;
use crate::tools::{ConvertKind, MeshMode, ToolInvoker};

/// Deterministic stand-in for the external toolchain.
///
/// "Models" are plain point listings, MRC files are TIFFs, the boundary mask
/// is the full frame, and contour extraction emits one rectangular contour
/// around the foreground of a mask. Every call is recorded by name.
pub struct FakeToolchain {
    pub header: VolumeHeader,
    calls: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl FakeToolchain {
    pub fn new(columns: u32, rows: u32, slices: u32) -> Self {
        Self {
            header: VolumeHeader {
                columns,
                rows,
                slices,
            },
            calls: RefCell::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Makes the operation recorded as `name` fail.
    pub fn failing_on(mut self, name: &'static str) -> Self {
        self.fail_on = Some(name);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Recorded calls whose operation name is one of `ops`.
    pub fn calls_matching(&self, ops: &[&str]) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| ops.contains(&c.split(':').next().unwrap_or("")))
            .cloned()
            .collect()
    }

    fn record(&self, call: String) -> PipelineResult<()> {
        let op = call.split(':').next().unwrap_or("").to_string();
        self.calls.borrow_mut().push(call.clone());
        if self.fail_on == Some(op.as_str()) {
            return Err(PipelineError::ExternalTool {
                command: call,
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounding box `(x0, y0, x1, y1)` of the foreground pixels.
fn foreground_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] < MASK_FOREGROUND {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}

impl ToolInvoker for FakeToolchain {
    fn volume_size(&self, _volume: &Path) -> PipelineResult<VolumeHeader> {
        self.record("header".into())?;
        Ok(self.header)
    }

    fn mask_slice(
        &self,
        _model: &Path,
        _volume: &Path,
        z: u32,
        output: &Path,
    ) -> PipelineResult<()> {
        self.record(format!("mask:{}", z))?;
        let full = GrayImage::from_pixel(self.header.columns, self.header.rows, Luma([1]));
        write_tiff(output, &full)
    }

    fn convert(&self, kind: ConvertKind, input: &Path, output: &Path) -> PipelineResult<()> {
        self.record(format!("convert:{:?}", kind))?;
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn extract_contours(
        &self,
        mask: &Path,
        _point_reduction: f64,
        output: &Path,
    ) -> PipelineResult<()> {
        self.record("extract".into())?;
        let mask = read_mask(mask)?;
        let rows = match foreground_bounds(&mask) {
            None => Vec::new(),
            Some((x0, y0, x1, y1)) => [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
                .iter()
                .map(|&(x, y)| PointRow {
                    object: 1,
                    contour: 1,
                    x: x as f64,
                    y: y as f64,
                    z: 0.0,
                })
                .collect(),
        };
        write_point_listing(output, &rows)
    }

    fn translate_z(&self, model: &Path, dz: u32) -> PipelineResult<()> {
        self.record(format!("translate:{}", dz))?;
        let rows: Vec<PointRow> = read_point_listing(model)?
            .into_iter()
            .map(|r| PointRow {
                z: r.z + dz as f64,
                ..r
            })
            .collect();
        // the real tool leaves a backup next to the model
        std::fs::copy(model, format!("{}~", model.display()))?;
        write_point_listing(model, &rows)
    }

    fn export_points(&self, model: &Path, output: &Path) -> PipelineResult<()> {
        self.record("export".into())?;
        std::fs::copy(model, output)?;
        Ok(())
    }

    fn import_points(&self, points: &Path, _volume: &Path, output: &Path) -> PipelineResult<()> {
        self.record("import".into())?;
        std::fs::copy(points, output)?;
        Ok(())
    }

    fn mesh(&self, _model: &Path, mode: MeshMode) -> PipelineResult<()> {
        let call = match mode {
            MeshMode::Surfaces { passes } => format!("mesh:surfaces:{}", passes),
            MeshMode::Erase => "mesh:erase".to_string(),
            MeshMode::Final => "mesh:final".to_string(),
        };
        self.record(call)
    }

    fn sort_surfaces(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        self.record("sort".into())?;
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn prune(&self, model: &Path, max_contours: u32) -> PipelineResult<()> {
        self.record(format!("prune:{}", max_contours))?;
        let rows = read_point_listing(model)?;
        let kept = ModelSummary::from_rows(&rows).pruned(max_contours);
        let rows: Vec<PointRow> = rows
            .into_iter()
            .filter(|r| kept.objects.iter().any(|o| o.object == r.object))
            .collect();
        write_point_listing(model, &rows)
    }

    fn annotate(
        &self,
        _model: &Path,
        _color: Option<Color>,
        _name: Option<&str>,
    ) -> PipelineResult<()> {
        self.record("annotate".into())
    }

    fn fill_gaps(&self, _model: &Path, skip: u32) -> PipelineResult<()> {
        self.record(format!("fill:{}", skip))
    }
}

/// Square of foreground pixels on a `width` x `height` background.
pub fn square_raster(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
