use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// Organelle slice files of `dir`, sorted by file name. The sort order is the
/// slice order, so callers must name their files accordingly (zero-padded indices).
/// Hidden files and sub-directories are ignored.
pub fn list_slice_files<P: AsRef<Path>>(dir: P) -> PipelineResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(PipelineError::InputNotFound {
            what: "segmentation directory",
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if hidden || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
