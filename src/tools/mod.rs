//! External volumetric/model toolchain.
//!
//! Every operation the pipeline delegates (masking, format conversion, contour
//! extraction, translation, meshing, sorting, pruning, gap filling) goes through
//! [`ToolInvoker`]. Operations are file based: inputs and outputs are paths
//! inside the run's workspace, and models are modified in place where the
//! toolchain does so.

pub mod imod;

use std::path::Path;

use crate::config::Color;
use crate::error::PipelineResult;
use crate::io::VolumeHeader;

pub use imod::ImodToolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertKind {
    MrcToTif,
    TifToMrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshMode {
    /// Closed, capped surfaces; `passes` empty slices may be crossed inside one surface.
    Surfaces { passes: u32 },
    /// Drop any existing mesh.
    Erase,
    /// Closed, capped surfaces without passing empty slices.
    Final,
}

pub trait ToolInvoker {
    /// Columns, rows and slices of a volume.
    fn volume_size(&self, volume: &Path) -> PipelineResult<VolumeHeader>;

    /// Binary mask of `model` over the single slice `z` of `volume`.
    fn mask_slice(&self, model: &Path, volume: &Path, z: u32, output: &Path)
        -> PipelineResult<()>;

    fn convert(&self, kind: ConvertKind, input: &Path, output: &Path) -> PipelineResult<()>;

    /// Traces the foreground of a mask slice into a model of contours.
    fn extract_contours(
        &self,
        mask: &Path,
        point_reduction: f64,
        output: &Path,
    ) -> PipelineResult<()>;

    /// Shifts every point of `model` by `dz` in z, in place.
    fn translate_z(&self, model: &Path, dz: u32) -> PipelineResult<()>;

    /// Writes `model` as an `<object> <contour> <x> <y> <z>` listing.
    fn export_points(&self, model: &Path, output: &Path) -> PipelineResult<()>;

    /// Builds a model from a point listing using the geometry of `volume`.
    fn import_points(&self, points: &Path, volume: &Path, output: &Path) -> PipelineResult<()>;

    fn mesh(&self, model: &Path, mode: MeshMode) -> PipelineResult<()>;

    /// Splits surfaces into objects and orders them.
    fn sort_surfaces(&self, input: &Path, output: &Path) -> PipelineResult<()>;

    /// Removes every object with `max_contours` contours or fewer, in place.
    fn prune(&self, model: &Path, max_contours: u32) -> PipelineResult<()>;

    /// Sets color and/or name of every object. Geometry is untouched.
    fn annotate(&self, model: &Path, color: Option<Color>, name: Option<&str>)
        -> PipelineResult<()>;

    /// Interpolates contours over gaps of up to `skip` slices, in place.
    fn fill_gaps(&self, model: &Path, skip: u32) -> PipelineResult<()>;

    /// Replaces the mesh with a final one built without empty-slice passes.
    fn finalize(&self, model: &Path) -> PipelineResult<()> {
        self.mesh(model, MeshMode::Erase)?;
        self.mesh(model, MeshMode::Final)
    }
}
