//! Working-directory layout and lifecycle.
//!
//! Layout: `<workdir>/data/raw/` holds the staged input, `data/clean/` the
//! reference pool, aligned-reference intermediate and consensus artifacts,
//! `results/` the per-worker SAM files, insertion pool and reference MSA.
//! Auto-generated directories are removed on success unless `--save-workdir`
//! is set; user-supplied directories are never deleted.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MsaError, Result};

pub const DATA_DIR: &str = "data";
pub const RAW_DIR: &str = "raw";
pub const CLEAN_DIR: &str = "clean";
pub const RESULTS_DIR: &str = "results";

pub struct Workdir {
    root: PathBuf,
    /// Present only for auto-generated directories; dropping it removes the
    /// tree.
    temp: Option<tempfile::TempDir>,
}

impl Workdir {
    /// Prepare the directory tree at `user_dir`, or under a fresh temporary
    /// directory when none is given.
    pub fn prepare(user_dir: Option<&Path>) -> Result<Self> {
        let (root, temp) = match user_dir {
            Some(dir) => (dir.to_path_buf(), None),
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("starmsa_")
                    .tempdir()
                    .map_err(|e| MsaError::io("tempdir", e))?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        for sub in [
            root.join(DATA_DIR).join(RAW_DIR),
            root.join(DATA_DIR).join(CLEAN_DIR),
            root.join(RESULTS_DIR),
        ] {
            fs::create_dir_all(&sub).map_err(|e| MsaError::io(&sub, e))?;
        }

        log::info!("working directory: {}", root.display());
        Ok(Workdir { root, temp })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR).join(RAW_DIR)
    }

    pub fn clean_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR).join(CLEAN_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    /// Copy the input FASTA into `data/raw/`, returning the staged path.
    pub fn stage_input(&self, input: &Path) -> Result<PathBuf> {
        let name = input
            .file_name()
            .ok_or_else(|| MsaError::invalid(format!("input has no file name: {}", input.display())))?;
        let dest = self.raw_dir().join(name);
        fs::copy(input, &dest).map_err(|e| MsaError::io(input, e))?;
        log::debug!("staged input: {}", dest.display());
        Ok(dest)
    }

    /// Finish the run. `save` persists an auto-generated directory instead
    /// of removing it.
    pub fn finish(self, save: bool) {
        if let Some(temp) = self.temp {
            if save {
                let kept = temp.into_path();
                log::info!("working directory kept: {}", kept.display());
            }
            // Dropping the TempDir otherwise removes the tree.
        }
    }
}
