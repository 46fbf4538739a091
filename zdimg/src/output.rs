//! Output path checks.

use std::path::Path;

use anyhow::{Context, bail};

/// Refuse to clobber the input, or an existing file without `--force`.
pub fn check_writable(input: &Path, output: &Path, force: bool) -> anyhow::Result<()> {
    if let (Ok(ci), Ok(co)) = (input.canonicalize(), output.canonicalize()) {
        if ci == co {
            bail!("output would overwrite input: {}", input.display());
        }
    }

    if output.exists() && !force {
        bail!(
            "output already exists: {}\nUse --force to overwrite",
            output.display()
        );
    }

    Ok(())
}

/// Create parent directories for the output path.
pub fn ensure_parent(output: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
