//! Defaults table stored as TOML, one section per action kind.
//!
//! ```toml
//! [Choose]
//! threshold = 0.5
//!
//! [Complete]
//! beams = 4
//! ```
//!
//! Sections and fields may be omitted; they take the built-in defaults.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::defaults::DefaultsTable;

/// Load the defaults table from `path`.
///
/// If the file is missing, returns `DefaultsTable::default()`.
pub fn load_defaults(path: &Path) -> Result<DefaultsTable> {
    if !path.exists() {
        debug!(path = %path.display(), "no defaults file; using built-in defaults");
        let table = DefaultsTable::default();
        table.validate()?;
        return Ok(table);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let table: DefaultsTable =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    table
        .validate()
        .with_context(|| format!("invalid defaults in {}", path.display()))?;
    Ok(table)
}

/// Atomically write the defaults table (temp file + rename).
pub fn write_defaults(path: &Path, table: &DefaultsTable) -> Result<()> {
    table.validate()?;
    let mut buf = toml::to_string_pretty(table).context("serialize defaults toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    // Same directory as the target, so the final rename stays on one filesystem.
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("stage defaults next to {}", path.display()))?;
    staged
        .write_all(contents.as_bytes())
        .and_then(|()| staged.as_file().sync_all())
        .with_context(|| format!("write staged defaults {}", staged.path().display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace defaults {}", path.display()))?;
    Ok(())
}
