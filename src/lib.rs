//! Merges per-slice organelle segmentations inside a whole-cell boundary model
//! into one meshed 3D model.
//!
//! Per slice the boundary mask is cut out of the volume, intersected with the
//! organelle mask, traced into contours and appended to one point listing
//! with globally re-based contour ids. The listing is then turned into a model
//! and run through the mesh-repair sequence of the external toolchain.

pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod processing;
pub mod tools;
mod utils;

#[cfg(feature = "python")]
mod binding;

pub use config::{Color, PipelineOptions};
pub use entry::{run_mask_whole_cell, run_pipeline, PipelineInputs, RunReport};
pub use error::{DataQualityWarning, PipelineError, PipelineResult};
pub use tools::{ImodToolchain, ToolInvoker};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import maskcellrs as mc
/// mc.mask_whole_cell("cell.mrc", "cell.mod", "segmentation/", fill_gaps=True)
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn maskcellrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    binding::register(m)
}
