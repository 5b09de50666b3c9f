use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::processing::assemble::PipelineStage;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fatal conditions. Any of these aborts the run without a final model.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Usage(String),

    #[error("the {what} {path:?} does not exist")]
    InputNotFound { what: &'static str, path: PathBuf },

    #[error("there is already a folder with the name tmp in the output path {0:?}")]
    WorkspaceExists(PathBuf),

    #[error("external tool `{command}` failed with {status}: {stderr}")]
    ExternalTool {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("external tool `{command}` did not finish within {limit:?} and was killed")]
    ToolTimedOut { command: String, limit: Duration },

    #[error("raster {path:?}: {source}")]
    Raster {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("point listing {path:?}, line {line}: {reason}")]
    PointListing {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("cannot accumulate slice listing: {0}")]
    Accumulation(String),

    #[error("illegal stage transition {from:?} -> {to:?}")]
    StageOrder {
        from: PipelineStage,
        to: PipelineStage,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors caused by how the tool was invoked; the CLI follows these with the help text.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            PipelineError::Usage(_)
                | PipelineError::InputNotFound { .. }
                | PipelineError::WorkspaceExists(_)
        )
    }
}

/// Recoverable anomalies. Logged and reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// A boundary contour whose points span more than one z.
    MixedZ {
        object: u32,
        contour: u32,
        values: Vec<i64>,
        resolved: i64,
    },
    /// Consecutive boundary contours are not on adjacent slices.
    NonContiguousSlice { object: u32, previous: i64, next: i64 },
}

impl std::fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataQualityWarning::MixedZ {
                object,
                contour,
                values,
                resolved,
            } => write!(
                f,
                "object {} contour {} spans z values {:?}; using z = {}",
                object, contour, values, resolved
            ),
            DataQualityWarning::NonContiguousSlice {
                object,
                previous,
                next,
            } if next > previous => write!(
                f,
                "missing contour in object {}: slice(s) {}..={} absent between z = {} and z = {}",
                object,
                previous + 1,
                next - 1,
                previous,
                next
            ),
            DataQualityWarning::NonContiguousSlice {
                object,
                previous,
                next,
            } => write!(
                f,
                "contours of object {} out of order: z = {} follows z = {}",
                object, next, previous
            ),
        }
    }
}
