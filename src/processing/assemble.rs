use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::accumulate::GlobalListing;
use crate::config::{Color, PipelineOptions};
use crate::error::{PipelineError, PipelineResult};
use crate::io::{read_point_listing, ModelSummary};
use crate::tools::{MeshMode, ToolInvoker};

/// Model stage file names inside the workspace.
pub const MODEL_FILE: &str = "out.mod";
pub const SORTED_MODEL_FILE: &str = "out_sort.mod";

/// Run state. `Finalized` is the only successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Masking,
    Accumulating,
    Assembling,
    Meshed,
    Sorted,
    Pruned,
    Filled,
    Finalized,
    Aborted,
}

impl PipelineStage {
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (Finalized | Aborted, _) => false,
            (_, Aborted) => true,
            (Init, Masking)
            | (Masking, Accumulating)
            | (Accumulating, Masking)
            | (Accumulating, Assembling)
            | (Assembling, Meshed)
            | (Meshed, Sorted)
            | (Sorted, Pruned)
            | (Pruned, Filled)
            | (Pruned, Finalized)
            | (Filled, Finalized) => true,
            _ => false,
        }
    }
}

/// Enforces the fixed stage order of a run.
#[derive(Debug, Clone)]
pub struct StageMachine {
    current: PipelineStage,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self {
            current: PipelineStage::Init,
        }
    }
}

impl StageMachine {
    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn advance(&mut self, next: PipelineStage) -> PipelineResult<()> {
        if !self.current.can_advance_to(next) {
            return Err(PipelineError::StageOrder {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        Ok(())
    }

    /// Marks the run as failed and returns the stage that was active.
    pub fn abort(&mut self) -> PipelineStage {
        let failed_in = self.current;
        if self.current.can_advance_to(PipelineStage::Aborted) {
            self.current = PipelineStage::Aborted;
        }
        failed_in
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOptions {
    pub mesh_passes: u32,
    pub rm_by_contours: u32,
    /// Slice skip for gap filling; `None` disables it.
    pub fill_skip: Option<u32>,
    pub color: Option<Color>,
    pub name: Option<String>,
}

impl From<&PipelineOptions> for AssemblyOptions {
    fn from(opts: &PipelineOptions) -> Self {
        Self {
            mesh_passes: opts.mesh_passes,
            rm_by_contours: opts.rm_by_contours,
            fill_skip: opts.fill_gaps.then_some(opts.fill_skip),
            color: opts.color,
            name: opts.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub before_prune: ModelSummary,
    pub after_prune: ModelSummary,
    pub model: PathBuf,
}

/// Turns the accumulated listing into the final meshed model.
///
/// Order is fixed: import, mesh, sort, prune, optional gap fill, finalize.
/// Pruning relies on sorted surfaces, and gap filling runs only on what
/// survived pruning.
pub struct ModelAssembler<'a, T: ToolInvoker + ?Sized> {
    tools: &'a T,
    workspace: &'a Path,
    options: AssemblyOptions,
}

impl<'a, T: ToolInvoker + ?Sized> ModelAssembler<'a, T> {
    pub fn new(tools: &'a T, workspace: &'a Path, options: AssemblyOptions) -> Self {
        Self {
            tools,
            workspace,
            options,
        }
    }

    pub fn assemble(
        &self,
        listing: &GlobalListing,
        volume: &Path,
        stages: &mut StageMachine,
    ) -> PipelineResult<AssemblyReport> {
        let opts = &self.options;
        let model = self.workspace.join(MODEL_FILE);
        let sorted = self.workspace.join(SORTED_MODEL_FILE);
        let surfaces = MeshMode::Surfaces {
            passes: opts.mesh_passes,
        };

        stages.advance(PipelineStage::Assembling)?;
        self.tools.import_points(&listing.path, volume, &model)?;

        self.tools.mesh(&model, surfaces)?;
        stages.advance(PipelineStage::Meshed)?;

        self.tools.sort_surfaces(&model, &sorted)?;
        stages.advance(PipelineStage::Sorted)?;

        let before_prune = self.summarize(&sorted)?;
        self.tools.prune(&sorted, opts.rm_by_contours)?;
        let after_prune = self.summarize(&sorted)?;
        stages.advance(PipelineStage::Pruned)?;
        info!(
            "pruning objects with <= {} contours: {} objects / {} contours -> {} objects / {} contours",
            opts.rm_by_contours,
            before_prune.objects.len(),
            before_prune.total_contours(),
            after_prune.objects.len(),
            after_prune.total_contours()
        );
        if after_prune.objects.is_empty() {
            warn!("no object has more than {} contours", opts.rm_by_contours);
        }

        self.tools
            .annotate(&sorted, opts.color, opts.name.as_deref())?;

        if let Some(skip) = opts.fill_skip {
            self.tools.mesh(&sorted, MeshMode::Erase)?;
            self.tools.mesh(&sorted, surfaces)?;
            self.tools.fill_gaps(&sorted, skip)?;
            stages.advance(PipelineStage::Filled)?;
        }

        self.tools.finalize(&sorted)?;
        stages.advance(PipelineStage::Finalized)?;

        Ok(AssemblyReport {
            before_prune,
            after_prune,
            model: sorted,
        })
    }

    fn summarize(&self, model: &Path) -> PipelineResult<ModelSummary> {
        let listing = model.with_extension("txt");
        self.tools.export_points(model, &listing)?;
        let rows = read_point_listing(&listing)?;
        std::fs::remove_file(&listing)?;
        Ok(ModelSummary::from_rows(&rows))
    }
}
