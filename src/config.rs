use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_RM_BY_CONTOURS: u32 = 2;
pub const DEFAULT_FILL_SKIP: u32 = 10;

/// Output color in R,G,B with every channel in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    /// Formatted the way the post-processing tool expects it: `R,G,B`.
    pub fn to_arg(&self) -> String {
        format!("{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(PipelineError::Usage(format!(
                "color {:?} must have the form R,G,B",
                s
            )));
        }
        let mut channels = [0.0f64; 3];
        for (slot, part) in channels.iter_mut().zip(&parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                PipelineError::Usage(format!("color channel {:?} is not a number", part))
            })?;
        }
        Ok(Color {
            r: channels[0],
            g: channels[1],
            b: channels[2],
        })
    }
}

/// Every tunable of a run. Deserializable from TOML; CLI flags override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    /// Point reduction handed to contour extraction, 0 keeps every point.
    pub point_reduction: f64,
    /// Empty slices the mesher may pass through before a surface is split.
    pub mesh_passes: u32,
    pub color: Option<Color>,
    pub name: Option<String>,
    /// Objects with this many contours or fewer are removed.
    pub rm_by_contours: u32,
    /// `None` means the current working directory.
    pub output_dir: Option<PathBuf>,
    pub fill_gaps: bool,
    pub fill_skip: u32,
    pub tool_timeout_secs: Option<u64>,
    /// Remove the `tmp/` workspace after a successful run.
    pub cleanup: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            point_reduction: 0.0,
            mesh_passes: 0,
            color: None,
            name: None,
            rm_by_contours: DEFAULT_RM_BY_CONTOURS,
            output_dir: None,
            fill_gaps: false,
            fill_skip: DEFAULT_FILL_SKIP,
            tool_timeout_secs: None,
            cleanup: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::InputNotFound {
                what: "config file",
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Usage(format!("invalid config: {}", e)))
    }

    /// Checks every value range. Performs no filesystem access.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.point_reduction) {
            return Err(PipelineError::Usage(format!(
                "point reduction must be between 0 and 1, got {}",
                self.point_reduction
            )));
        }
        if let Some(color) = &self.color {
            for (label, value) in [("R", color.r), ("G", color.g), ("B", color.b)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(PipelineError::Usage(format!(
                        "color channel {} must be between 0 and 1, got {}",
                        label, value
                    )));
                }
            }
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(PipelineError::Usage("object name must not be empty".into()));
            }
        }
        if self.fill_skip == 0 {
            return Err(PipelineError::Usage(
                "gap-fill slice skip must be at least 1".into(),
            ));
        }
        if self.tool_timeout_secs == Some(0) {
            return Err(PipelineError::Usage("tool timeout must be positive".into()));
        }
        Ok(())
    }

    /// Resolved output directory; it must already exist.
    pub fn resolve_output_dir(&self) -> PipelineResult<PathBuf> {
        let dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        if !dir.is_dir() {
            return Err(PipelineError::Usage(format!(
                "the output path {} does not exist",
                dir.display()
            )));
        }
        Ok(dir)
    }
}
