use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineOptions;
use crate::error::{DataQualityWarning, PipelineError, PipelineResult};
use crate::io::segmentation::list_slice_files;
use crate::io::raster::write_tiff;
use crate::io::{group_contours, read_point_listing, ModelSummary, VolumeHeader};
use crate::processing::accumulate::{ContourAccumulator, SliceListing};
use crate::processing::assemble::{
    AssemblyOptions, ModelAssembler, PipelineStage, StageMachine, SORTED_MODEL_FILE,
};
use crate::processing::mask::SliceMaskBuilder;
use crate::processing::zorder::check_boundary_order;
use crate::tools::{ConvertKind, ImodToolchain, ToolInvoker};

pub const WORKSPACE_DIR: &str = "tmp";
pub const LISTING_FILE: &str = "out.txt";

/// The three positional inputs of a run.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub volume: PathBuf,
    pub boundary_model: PathBuf,
    pub segmentation_dir: PathBuf,
}

impl PipelineInputs {
    fn check_exist(&self) -> PipelineResult<()> {
        let checks: [(&'static str, &Path, bool); 3] = [
            ("volume file", self.volume.as_path(), self.volume.is_file()),
            (
                "model file",
                self.boundary_model.as_path(),
                self.boundary_model.is_file(),
            ),
            (
                "segmentation directory",
                self.segmentation_dir.as_path(),
                self.segmentation_dir.is_dir(),
            ),
        ];
        for (what, path, ok) in checks {
            if !ok {
                return Err(PipelineError::InputNotFound {
                    what,
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

/// Scratch directory `<output>/tmp`, owned by exactly one run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn path_in(output_dir: &Path) -> PathBuf {
        output_dir.join(WORKSPACE_DIR)
    }

    /// Creates the workspace; refuses to reuse one that already exists.
    pub fn create(output_dir: &Path) -> PipelineResult<Self> {
        let root = Self::path_in(output_dir);
        if root.exists() {
            return Err(PipelineError::WorkspaceExists(output_dir.to_path_buf()));
        }
        std::fs::create_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Extension-less stem of the per-slice artifacts, e.g. `tmp/tmp0042`.
    pub fn slice_stem(&self, z: u32) -> PathBuf {
        self.root.join(format!("tmp{:04}", z))
    }

    pub fn remove(self) -> PipelineResult<()> {
        std::fs::remove_dir_all(&self.root)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceReport {
    pub z: u32,
    pub contours: u32,
    pub total_after: u32,
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub volume: VolumeHeader,
    pub slices: Vec<SliceReport>,
    pub total_contours: u32,
    pub before_prune: ModelSummary,
    pub after_prune: ModelSummary,
    pub warnings: Vec<DataQualityWarning>,
    pub final_model: PathBuf,
    pub stage: PipelineStage,
}

impl RunReport {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Could not create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("Failed to serialize run report")?;
        Ok(())
    }
}

/// Runs the pipeline against the installed toolchain.
pub fn run_mask_whole_cell(inputs: &PipelineInputs, options: &PipelineOptions) -> Result<RunReport> {
    let tools = ImodToolchain::new().with_timeout(options.tool_timeout_secs.map(Duration::from_secs));
    run_pipeline(&tools, inputs, options)
}

/// Validates, creates the workspace, processes every slice and assembles the final model.
///
/// Nothing is written before validation has passed. On failure the workspace is
/// left as is and must not be resumed.
pub fn run_pipeline<T: ToolInvoker + ?Sized>(
    tools: &T,
    inputs: &PipelineInputs,
    options: &PipelineOptions,
) -> Result<RunReport> {
    options.validate()?;
    let output_dir = options.resolve_output_dir()?;
    inputs.check_exist()?;
    if Workspace::path_in(&output_dir).exists() {
        return Err(PipelineError::WorkspaceExists(output_dir).into());
    }

    let header = tools
        .volume_size(&inputs.volume)
        .context("Failed to read the volume size")?;
    if header.slices == 0 {
        return Err(PipelineError::Usage(format!(
            "volume {} has no slices",
            inputs.volume.display()
        ))
        .into());
    }
    let organelle_files = list_slice_files(&inputs.segmentation_dir)?;
    if organelle_files.len() < header.slices as usize {
        return Err(PipelineError::Usage(format!(
            "segmentation directory {} holds {} files but the volume has {} slices",
            inputs.segmentation_dir.display(),
            organelle_files.len(),
            header.slices
        ))
        .into());
    }
    if organelle_files.len() > header.slices as usize {
        warn!(
            "{} segmentation files beyond the volume's {} slices are ignored",
            organelle_files.len() - header.slices as usize,
            header.slices
        );
    }

    let workspace = Workspace::create(&output_dir)?;
    info!(
        "volume {} x {} x {}, workspace {}",
        header.columns,
        header.rows,
        header.slices,
        workspace.root().display()
    );

    let mut stages = StageMachine::default();
    match drive(tools, inputs, options, &header, &organelle_files, &workspace, &mut stages) {
        Ok(mut report) => {
            let final_model = output_dir.join(SORTED_MODEL_FILE);
            std::fs::copy(&report.final_model, &final_model).with_context(|| {
                format!("Could not copy the final model to {}", final_model.display())
            })?;
            report.final_model = final_model;
            if options.cleanup {
                workspace.remove().context("Could not remove the workspace")?;
            }
            info!("wrote {}", report.final_model.display());
            Ok(report)
        }
        Err(e) => {
            let failed_in = stages.abort();
            Err(e.context(format!("Run aborted during {:?}", failed_in)))
        }
    }
}

fn drive<T: ToolInvoker + ?Sized>(
    tools: &T,
    inputs: &PipelineInputs,
    options: &PipelineOptions,
    header: &VolumeHeader,
    organelle_files: &[PathBuf],
    workspace: &Workspace,
    stages: &mut StageMachine,
) -> Result<RunReport> {
    let warnings = boundary_z_warnings(tools, &inputs.boundary_model, workspace)
        .context("Failed to check the slice order of the boundary model")?;
    for w in &warnings {
        warn!("{}", w);
    }

    let builder = SliceMaskBuilder::new(*header);
    let mut accumulator = ContourAccumulator::create(workspace.file(LISTING_FILE))?;
    let mut slices = Vec::with_capacity(header.slices as usize);

    for (z, organelle) in (0..header.slices).zip(organelle_files) {
        stages.advance(PipelineStage::Masking)?;
        let listing = extract_slice(tools, inputs, options, &builder, organelle, z, workspace)
            .with_context(|| format!("Failed to process slice {} ({})", z, organelle.display()))?;

        stages.advance(PipelineStage::Accumulating)?;
        let total = accumulator.absorb(&listing)?;
        slices.push(SliceReport {
            z,
            contours: listing.contour_count,
            total_after: total.0,
        });
    }

    let global = accumulator.finish()?;
    if global.contours == 0 {
        return Err(PipelineError::Accumulation(
            "no contours were extracted from any slice".into(),
        )
        .into());
    }

    let assembly = ModelAssembler::new(tools, workspace.root(), AssemblyOptions::from(options))
        .assemble(&global, &inputs.volume, stages)?;

    Ok(RunReport {
        volume: *header,
        slices,
        total_contours: global.contours,
        before_prune: assembly.before_prune,
        after_prune: assembly.after_prune,
        warnings,
        final_model: assembly.model,
        stage: stages.current(),
    })
}

/// Z-order of the boundary model's own contours, per object: mixed-z
/// contours and non-adjacent consecutive slices.
fn boundary_z_warnings<T: ToolInvoker + ?Sized>(
    tools: &T,
    boundary_model: &Path,
    workspace: &Workspace,
) -> PipelineResult<Vec<DataQualityWarning>> {
    let listing = workspace.file("boundary.txt");
    tools.export_points(boundary_model, &listing)?;
    let rows = read_point_listing(&listing)?;
    std::fs::remove_file(&listing)?;

    Ok(check_boundary_order(&group_contours(&rows)))
}

/// Mask → contours → slice listing for one slice. All per-slice files are
/// removed before returning.
fn extract_slice<T: ToolInvoker + ?Sized>(
    tools: &T,
    inputs: &PipelineInputs,
    options: &PipelineOptions,
    builder: &SliceMaskBuilder,
    organelle: &Path,
    z: u32,
    workspace: &Workspace,
) -> PipelineResult<SliceListing> {
    let stem = workspace.slice_stem(z);
    let tif = stem.with_extension("tif");
    let mrc = stem.with_extension("mrc");
    let model = stem.with_extension("mod");
    let points = stem.with_extension("txt");

    let mask = builder.build(
        tools,
        &inputs.volume,
        &inputs.boundary_model,
        organelle,
        z,
        &stem,
    )?;
    write_tiff(&tif, &mask)?;
    tools.convert(ConvertKind::TifToMrc, &tif, &mrc)?;
    std::fs::remove_file(&tif)?;

    tools.extract_contours(&mrc, options.point_reduction, &model)?;
    std::fs::remove_file(&mrc)?;
    tools.translate_z(&model, z)?;
    tools.export_points(&model, &points)?;
    std::fs::remove_file(&model)?;
    let backup = PathBuf::from(format!("{}~", model.display()));
    if backup.exists() {
        std::fs::remove_file(&backup)?;
    }

    let rows = read_point_listing(&points)?;
    std::fs::remove_file(&points)?;
    Ok(SliceListing::from_rows(z, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{square_raster, FakeToolchain};
    use image::GrayImage;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        inputs: PipelineInputs,
    }

    impl Fixture {
        fn output(&self) -> PathBuf {
            self.dir.path().join("out")
        }
    }

    /// Volume and boundary files are placeholders; the fake toolchain never reads them.
    fn fixture(organelles: &[GrayImage], boundary_listing: &str) -> Fixture {
        let dir = tempdir().unwrap();
        let seg = dir.path().join("seg");
        std::fs::create_dir(&seg).unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        for (i, img) in organelles.iter().enumerate() {
            img.save(seg.join(format!("org_{:03}.png", i))).unwrap();
        }
        let volume = dir.path().join("cell.mrc");
        std::fs::write(&volume, b"mrc").unwrap();
        let boundary_model = dir.path().join("cell.mod");
        std::fs::write(&boundary_model, boundary_listing).unwrap();
        Fixture {
            inputs: PipelineInputs {
                volume,
                boundary_model,
                segmentation_dir: seg,
            },
            dir,
        }
    }

    fn options(f: &Fixture, rm_by_contours: u32) -> PipelineOptions {
        PipelineOptions {
            rm_by_contours,
            output_dir: Some(f.output()),
            ..Default::default()
        }
    }

    const BOUNDARY: &str = "1 1 0 0 0\n1 2 0 0 1\n1 3 0 0 2\n";

    #[test]
    fn test_three_slices_one_empty() {
        let organelles = vec![
            GrayImage::new(32, 32),
            square_raster(32, 32, 8, 8, 10),
            square_raster(32, 32, 8, 8, 10),
        ];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(32, 32, 3);

        let report = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap();

        let per_slice: Vec<(u32, u32)> = report.slices.iter().map(|s| (s.contours, s.total_after)).collect();
        assert_eq!(per_slice, vec![(0, 0), (1, 1), (1, 2)]);
        assert_eq!(report.total_contours, 2);
        assert_eq!(report.after_prune.objects.len(), 1);
        assert_eq!(report.after_prune.objects[0].contours, 2);
        assert_eq!(report.stage, PipelineStage::Finalized);
        assert!(report.warnings.is_empty());

        // slice 1 contributed nothing, so slice 2 starts at id 1
        let listing = read_point_listing(f.output().join(WORKSPACE_DIR).join(LISTING_FILE)).unwrap();
        let ids: Vec<(u32, f64)> = listing.iter().map(|r| (r.contour, r.z)).collect();
        assert!(ids.iter().all(|&(c, z)| (c == 1 && z == 1.0) || (c == 2 && z == 2.0)));
        assert!(report.final_model.is_file());
        assert_eq!(report.final_model, f.output().join(SORTED_MODEL_FILE));
    }

    #[test]
    fn test_per_slice_artifacts_are_removed() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(16, 16, 2);
        run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap();

        let mut left: Vec<String> = std::fs::read_dir(f.output().join(WORKSPACE_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["out.mod", "out.txt", "out_sort.mod"]);
    }

    #[test]
    fn test_cleanup_removes_workspace() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(16, 16, 2);
        let opts = PipelineOptions {
            cleanup: true,
            ..options(&f, 0)
        };
        let report = run_pipeline(&tools, &f.inputs, &opts).unwrap();
        assert!(!f.output().join(WORKSPACE_DIR).exists());
        assert!(report.final_model.is_file());
    }

    #[test]
    fn test_gap_in_boundary_warns_and_continues() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 3];
        let f = fixture(&organelles, "1 1 0 0 0\n1 2 0 0 2\n1 3 0 0 3\n1 3 0 0 4\n1 3 0 0 3\n");
        let tools = FakeToolchain::new(16, 16, 3);
        let report = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap();

        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .contains(&DataQualityWarning::NonContiguousSlice {
                object: 1,
                previous: 0,
                next: 2
            }));
        assert!(matches!(report.warnings[0], DataQualityWarning::MixedZ { resolved: 3, .. }));
    }

    #[test]
    fn test_two_object_boundary_has_no_false_gap() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 3];
        let f = fixture(
            &organelles,
            "1 1 0 0 0\n1 2 0 0 1\n1 3 0 0 2\n2 1 4 4 0\n2 2 4 4 1\n2 3 4 4 2\n",
        );
        let tools = FakeToolchain::new(16, 16, 3);
        let report = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_existing_workspace_is_refused_before_any_tool_runs() {
        let organelles = vec![GrayImage::new(8, 8)];
        let f = fixture(&organelles, BOUNDARY);
        std::fs::create_dir(f.output().join(WORKSPACE_DIR)).unwrap();
        let tools = FakeToolchain::new(8, 8, 1);

        let err = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap_err();
        let err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(err, PipelineError::WorkspaceExists(_)));
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let organelles = vec![GrayImage::new(8, 8)];
        let mut f = fixture(&organelles, BOUNDARY);
        f.inputs.volume = f.dir.path().join("nope.mrc");
        let tools = FakeToolchain::new(8, 8, 1);

        let err = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().unwrap().is_usage());
        assert!(!f.output().join(WORKSPACE_DIR).exists());
    }

    #[test]
    fn test_too_few_segmentation_files() {
        let organelles = vec![GrayImage::new(8, 8); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(8, 8, 3);

        let err = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap_err();
        assert!(err.to_string().contains("holds 2 files"));
        assert!(!f.output().join(WORKSPACE_DIR).exists());
    }

    #[test]
    fn test_tool_failure_aborts_without_final_model() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(16, 16, 2).failing_on("extract");

        let err = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap_err();
        assert!(format!("{:#}", err).contains("Masking"));
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ExternalTool { .. })
        ));
        assert!(!f.output().join(SORTED_MODEL_FILE).exists());
    }

    #[test]
    fn test_all_empty_slices_abort() {
        let organelles = vec![GrayImage::new(8, 8); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(8, 8, 2);
        let err = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Accumulation(_))
        ));
    }

    #[test]
    fn test_report_json() {
        let organelles = vec![square_raster(16, 16, 2, 2, 4); 2];
        let f = fixture(&organelles, BOUNDARY);
        let tools = FakeToolchain::new(16, 16, 2);
        let report = run_pipeline(&tools, &f.inputs, &options(&f, 0)).unwrap();

        let path = f.dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(value["total_contours"].as_u64(), Some(2));
        assert_eq!(value["stage"].as_str(), Some("finalized"));
    }
}
