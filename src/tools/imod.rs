use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crossbeam::thread;
use tracing::debug;

use super::{ConvertKind, MeshMode, ToolInvoker};
use crate::config::Color;
use crate::error::{PipelineError, PipelineResult};
use crate::io::VolumeHeader;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully rendered command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn arg<S: ToString>(mut self, arg: S) -> Self {
        self.args.push(arg.to_string());
        self
    }

    fn path(self, path: &Path) -> Self {
        self.arg(path.display())
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs the IMOD command-line programs as child processes.
#[derive(Debug, Clone, Default)]
pub struct ImodToolchain {
    /// Directory holding the programs; `None` resolves them through `PATH`.
    pub bin_dir: Option<PathBuf>,
    /// Kill a program that runs longer than this.
    pub timeout: Option<Duration>,
}

impl ImodToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bin_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    fn program_path(&self, program: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(program),
            None => PathBuf::from(program),
        }
    }

    /// Runs `cmd` to completion and returns its stdout. A non-zero exit status is an error.
    pub fn run(&self, cmd: &ToolCommand) -> PipelineResult<String> {
        let line = cmd.display();
        debug!("running {}", line);

        let mut child = Command::new(self.program_path(&cmd.program))
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::ExternalTool {
                command: line.clone(),
                status: "spawn failure".to_string(),
                stderr: e.to_string(),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // drain both pipes while waiting so a chatty tool cannot block on a full pipe
        let (status, out, err) = thread::scope(|s| {
            let out = s.spawn(move |_| read_pipe(stdout));
            let err = s.spawn(move |_| read_pipe(stderr));
            let status = self.wait(&mut child, &line);
            (
                status,
                out.join().unwrap_or_default(),
                err.join().unwrap_or_default(),
            )
        })
        .map_err(|_| PipelineError::ExternalTool {
            command: line.clone(),
            status: "output reader panicked".to_string(),
            stderr: String::new(),
        })?;

        let status = status?;
        if !status.success() {
            return Err(PipelineError::ExternalTool {
                command: line,
                status: status.to_string(),
                stderr: err.trim().to_string(),
            });
        }
        Ok(out)
    }

    fn wait(&self, child: &mut Child, line: &str) -> PipelineResult<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait()?);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                // already exited between the poll and the kill is fine
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::ToolTimedOut {
                    command: line.to_string(),
                    limit,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

pub fn header_size(volume: &Path) -> ToolCommand {
    ToolCommand::new("header").arg("-size").path(volume)
}

pub fn imodmop_mask(model: &Path, volume: &Path, z: u32, output: &Path) -> ToolCommand {
    ToolCommand::new("imodmop")
        .arg("-mask")
        .arg(1)
        .arg("-zminmax")
        .arg(format!("{0},{0}", z))
        .path(model)
        .path(volume)
        .path(output)
}

pub fn convert(kind: ConvertKind, input: &Path, output: &Path) -> ToolCommand {
    let program = match kind {
        ConvertKind::MrcToTif => "mrc2tif",
        ConvertKind::TifToMrc => "tif2mrc",
    };
    ToolCommand::new(program).path(input).path(output)
}

pub fn imodauto(mask: &Path, point_reduction: f64, output: &Path) -> ToolCommand {
    ToolCommand::new("imodauto")
        .arg("-E")
        .arg(255)
        .arg("-u")
        .arg("-R")
        .arg(point_reduction)
        .path(mask)
        .path(output)
}

pub fn imodtrans_z(model: &Path, dz: u32) -> ToolCommand {
    ToolCommand::new("imodtrans")
        .arg("-tz")
        .arg(dz)
        .path(model)
        .path(model)
}

pub fn model2point(model: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new("model2point")
        .arg("-object")
        .path(model)
        .path(output)
}

pub fn point2model(points: &Path, volume: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new("point2model")
        .arg("-image")
        .path(volume)
        .path(points)
        .path(output)
}

pub fn imodmesh(model: &Path, mode: MeshMode) -> ToolCommand {
    let cmd = ToolCommand::new("imodmesh");
    let cmd = match mode {
        MeshMode::Surfaces { passes } => cmd.arg("-CTs").arg("-P").arg(passes),
        MeshMode::Erase => cmd.arg("-e"),
        MeshMode::Final => cmd.arg("-CT"),
    };
    cmd.path(model)
}

pub fn imodsortsurf(input: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new("imodsortsurf")
        .arg("-s")
        .path(input)
        .path(output)
}

pub fn edmod_prune(model: &Path, max_contours: u32) -> ToolCommand {
    ToolCommand::new("edmod.py")
        .arg("--rmbycont")
        .arg(max_contours)
        .path(model)
        .path(model)
}

pub fn edmod_annotate(model: &Path, color: Option<Color>, name: Option<&str>) -> ToolCommand {
    let mut cmd = ToolCommand::new("edmod.py");
    if let Some(color) = color {
        cmd = cmd.arg("--colorout").arg(color.to_arg());
    }
    if let Some(name) = name {
        cmd = cmd.arg("--nameout").arg(name);
    }
    cmd.path(model).path(model)
}

pub fn imodfillin(model: &Path, skip: u32) -> ToolCommand {
    ToolCommand::new("imodfillin")
        .arg("-e")
        .arg("-s")
        .arg(skip)
        .path(model)
        .path(model)
}

impl ToolInvoker for ImodToolchain {
    fn volume_size(&self, volume: &Path) -> PipelineResult<VolumeHeader> {
        let out = self.run(&header_size(volume))?;
        VolumeHeader::parse_size(&out)
    }

    fn mask_slice(
        &self,
        model: &Path,
        volume: &Path,
        z: u32,
        output: &Path,
    ) -> PipelineResult<()> {
        self.run(&imodmop_mask(model, volume, z, output)).map(drop)
    }

    fn convert(&self, kind: ConvertKind, input: &Path, output: &Path) -> PipelineResult<()> {
        self.run(&convert(kind, input, output)).map(drop)
    }

    fn extract_contours(
        &self,
        mask: &Path,
        point_reduction: f64,
        output: &Path,
    ) -> PipelineResult<()> {
        self.run(&imodauto(mask, point_reduction, output)).map(drop)
    }

    fn translate_z(&self, model: &Path, dz: u32) -> PipelineResult<()> {
        self.run(&imodtrans_z(model, dz)).map(drop)
    }

    fn export_points(&self, model: &Path, output: &Path) -> PipelineResult<()> {
        self.run(&model2point(model, output)).map(drop)
    }

    fn import_points(&self, points: &Path, volume: &Path, output: &Path) -> PipelineResult<()> {
        self.run(&point2model(points, volume, output)).map(drop)
    }

    fn mesh(&self, model: &Path, mode: MeshMode) -> PipelineResult<()> {
        self.run(&imodmesh(model, mode)).map(drop)
    }

    fn sort_surfaces(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        self.run(&imodsortsurf(input, output)).map(drop)
    }

    fn prune(&self, model: &Path, max_contours: u32) -> PipelineResult<()> {
        self.run(&edmod_prune(model, max_contours)).map(drop)
    }

    fn annotate(
        &self,
        model: &Path,
        color: Option<Color>,
        name: Option<&str>,
    ) -> PipelineResult<()> {
        if color.is_none() && name.is_none() {
            return Ok(());
        }
        self.run(&edmod_annotate(model, color, name)).map(drop)
    }

    fn fill_gaps(&self, model: &Path, skip: u32) -> PipelineResult<()> {
        self.run(&imodfillin(model, skip)).map(drop)
    }
}
