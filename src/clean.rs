use std::fs;
use std::io;
use std::path::Path;

use log::info;

use crate::config::Config;
use crate::types::FatalError;

/// Removes both generated trees. Missing directories are not an error, and
/// the parent roots are only removed once they are empty, so a root shared
/// with hand-written files is left alone.
pub fn clean(config: &Config) -> Result<(), FatalError> {
    remove_tree(&config.include_dir())?;
    remove_if_empty(&config.include_root)?;
    remove_tree(&config.source_dir())?;
    remove_if_empty(&config.source_root)?;
    Ok(())
}

fn remove_tree(path: &Path) -> Result<(), FatalError> {
    info!("removing {}", path.display());
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn remove_if_empty(path: &Path) -> Result<(), FatalError> {
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if entries.next().is_none() {
        fs::remove_dir(path)?;
    }
    Ok(())
}
