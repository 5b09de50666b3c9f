pub mod classes;

use std::path::PathBuf;

use classes::{PyRunReport, PySliceReport};
use pyo3::prelude::*;

use crate::config::{Color, PipelineOptions};
use crate::entry::{run_mask_whole_cell, PipelineInputs};

/// Merges per-slice organelle masks inside a whole-cell boundary model into one
/// meshed model.
///
/// Args:
///     volume: Path to the volume (MRC) file
///     boundary_model: Path to the whole-cell boundary model
///     segmentation_dir: Directory with one organelle mask per slice, sorted by name
///     point_reduction (default 0.0): Point reduction for contour tracing, 0-1
///     mesh_passes (default 0): Empty slices the mesher may pass through
///     color (default None): Object color "R,G,B", each 0-1
///     name (default None): Object name
///     rm_by_contours (default 2): Remove objects with this many contours or fewer
///     output_dir (default None): Output directory, current directory if None
///     fill_gaps (default False): Interpolate contours across skipped slices
///     fill_skip (default 10): Largest slice gap that is filled
///     timeout_secs (default None): Kill any external tool running longer than this
///     cleanup (default False): Remove the tmp workspace after success
///
/// Returns:
///     PyRunReport
///
/// Example:
///     >>> import maskcellrs as mc
///     >>> report = mc.mask_whole_cell("cell.mrc", "cell.mod", "seg/", name="mito")
#[pyfunction]
#[pyo3(signature = (
    volume,
    boundary_model,
    segmentation_dir,
    point_reduction = 0.0,
    mesh_passes = 0,
    color = None,
    name = None,
    rm_by_contours = 2,
    output_dir = None,
    fill_gaps = false,
    fill_skip = 10,
    timeout_secs = None,
    cleanup = false
))]
#[allow(clippy::too_many_arguments)]
fn mask_whole_cell(
    volume: &str,
    boundary_model: &str,
    segmentation_dir: &str,
    point_reduction: f64,
    mesh_passes: u32,
    color: Option<&str>,
    name: Option<String>,
    rm_by_contours: u32,
    output_dir: Option<&str>,
    fill_gaps: bool,
    fill_skip: u32,
    timeout_secs: Option<u64>,
    cleanup: bool,
) -> PyResult<PyRunReport> {
    let to_value_err = |e: String| pyo3::exceptions::PyValueError::new_err(e);

    let color = color
        .map(|c| c.parse::<Color>())
        .transpose()
        .map_err(|e| to_value_err(e.to_string()))?;
    let options = PipelineOptions {
        point_reduction,
        mesh_passes,
        color,
        name,
        rm_by_contours,
        output_dir: output_dir.map(PathBuf::from),
        fill_gaps,
        fill_skip,
        tool_timeout_secs: timeout_secs,
        cleanup,
    };
    let inputs = PipelineInputs {
        volume: PathBuf::from(volume),
        boundary_model: PathBuf::from(boundary_model),
        segmentation_dir: PathBuf::from(segmentation_dir),
    };

    let report = run_mask_whole_cell(&inputs, &options)
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(format!("{:#}", e)))?;
    Ok(PyRunReport::from(&report))
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(mask_whole_cell, m)?)?;
    m.add_class::<PyRunReport>()?;
    m.add_class::<PySliceReport>()?;
    Ok(())
}
