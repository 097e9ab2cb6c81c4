//! External plot script invocation.
//!
//! Plotting is a side effect delegated to an external script; its failure
//! is reported but never invalidates metrics that were already written.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Run the plot script over a dataset written to `dir`.
///
/// The script receives `--dir <dir> --data <data_name>` and is expected to
/// read `<data_name>.csv` and leave its plot artifacts alongside it.
pub fn invoke(script: &Path, dir: &Path, data_name: &str) -> Result<()> {
    info!(script = %script.display(), data_name, "invoking plot script");

    let status = Command::new(script)
        .arg("--dir")
        .arg(dir)
        .arg("--data")
        .arg(data_name)
        .status()
        .with_context(|| format!("spawning plot script {}", script.display()))?;

    if !status.success() {
        bail!("plot script {} exited with {status}", script.display());
    }

    Ok(())
}
