use anyhow::{Result, bail};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

const EVTX_EXTENSION: &str = "evtx";

/// Every `*.evtx` file below `root`, in sorted order.
///
/// Symbolic links are not followed.
pub fn collect_evtx_paths(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Directory `{}` does not exist", root.display());
    }

    let mut out_files = vec![];
    let mut queue = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Unable to read directory '{}': {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let p = entry.path();
            if file_type.is_symlink() {
                debug!("Skipping symlink '{}'", p.display());
            } else if file_type.is_dir() {
                queue.push_back(p);
            } else if file_type.is_file() && has_evtx_extension(&p) {
                out_files.push(p);
            }
        }
    }

    out_files.sort();
    Ok(out_files)
}

fn has_evtx_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(EVTX_EXTENSION))
}
