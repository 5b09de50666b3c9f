use pyo3::prelude::*;

use crate::entry::{RunReport, SliceReport};
use crate::io::ObjectSummary;

/// Contour count of one slice.
///
/// Attributes:
///     z (int): Slice index (0-based)
///     contours (int): Contours extracted on this slice
///     total_after (int): Running global contour count after this slice
#[pyclass]
#[derive(Debug, Clone)]
pub struct PySliceReport {
    #[pyo3(get)]
    pub z: u32,
    #[pyo3(get)]
    pub contours: u32,
    #[pyo3(get)]
    pub total_after: u32,
}

#[pymethods]
impl PySliceReport {
    fn __repr__(&self) -> String {
        format!(
            "SliceReport(z={}, contours={}, total_after={})",
            self.z, self.contours, self.total_after
        )
    }
}

impl From<&SliceReport> for PySliceReport {
    fn from(s: &SliceReport) -> Self {
        Self {
            z: s.z,
            contours: s.contours,
            total_after: s.total_after,
        }
    }
}

/// Result of a finished run.
///
/// Attributes:
///     final_model (str): Path of the final model
///     total_contours (int): Contours accumulated over all slices
///     slices (list[PySliceReport]): Per-slice contour counts
///     objects_before_prune (list[tuple[int, int]]): (object, contours) after sorting
///     objects_after_prune (list[tuple[int, int]]): (object, contours) that survived pruning
///     warnings (list[str]): Data-quality warnings raised during the run
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyRunReport {
    #[pyo3(get)]
    pub final_model: String,
    #[pyo3(get)]
    pub total_contours: u32,
    #[pyo3(get)]
    pub slices: Vec<PySliceReport>,
    #[pyo3(get)]
    pub objects_before_prune: Vec<(u32, usize)>,
    #[pyo3(get)]
    pub objects_after_prune: Vec<(u32, usize)>,
    #[pyo3(get)]
    pub warnings: Vec<String>,
}

#[pymethods]
impl PyRunReport {
    fn __repr__(&self) -> String {
        format!(
            "RunReport(final_model={:?}, total_contours={}, objects={}, warnings={})",
            self.final_model,
            self.total_contours,
            self.objects_after_prune.len(),
            self.warnings.len()
        )
    }
}

fn object_tuples(objects: &[ObjectSummary]) -> Vec<(u32, usize)> {
    objects.iter().map(|o| (o.object, o.contours)).collect()
}

impl From<&RunReport> for PyRunReport {
    fn from(report: &RunReport) -> Self {
        Self {
            final_model: report.final_model.display().to_string(),
            total_contours: report.total_contours,
            slices: report.slices.iter().map(PySliceReport::from).collect(),
            objects_before_prune: object_tuples(&report.before_prune.objects),
            objects_after_prune: object_tuples(&report.after_prune.objects),
            warnings: report.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}
