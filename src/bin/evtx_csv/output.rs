use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Name used when `--csvf` is not given, stamped with the run start (UTC).
pub fn default_file_name() -> String {
    format!(
        "{}-evtx-csv.csv",
        jiff::Timestamp::now().strftime("%Y%m%d%H%M%S")
    )
}

/// The output file inside `csv_dir`. Only the last component of `file_name` is used.
pub fn resolve(csv_dir: &Path, file_name: Option<&String>) -> Result<PathBuf> {
    let Some(name) = file_name else {
        return Ok(csv_dir.join(default_file_name()));
    };

    match Path::new(name).file_name() {
        Some(base) => Ok(csv_dir.join(base)),
        None => bail!("`{}` is not a valid file name", name),
    }
}

/// Makes sure `path` can be written to.
///
/// If `prompt` is passed, will display a confirmation prompt before overwriting files.
/// Parent directories are created as needed.
pub fn prepare(path: &Path, prompt: bool) -> Result<()> {
    if path.is_dir() {
        bail!(
            "There is a directory at {}, refusing to overwrite",
            path.display()
        );
    }

    if path.exists() {
        if !prompt {
            return Ok(());
        }

        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to override output file at {}",
                path.display()
            ))
            .default(false)
            .interact()
            .context("Failed to write confirmation prompt to term")?;

        if !confirmed {
            bail!("Cancelled");
        }

        return Ok(());
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!("Creating output directory '{}'", parent.display());
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory `{}`", parent.display())
            })
        }
        Some(_) => Ok(()),
        None => bail!("Output file cannot be root."),
    }
}
