//! Manifest
//!
//! Plain-text list of live SSTable files, one name per line, oldest first.
//! Never edited in place: every change writes `MANIFEST.tmp`, syncs it and
//! renames it over `MANIFEST`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::LsmError;

use super::sync_dir;

/// Manifest file name inside the store directory
pub const MANIFEST_FILE: &str = "MANIFEST";

const MANIFEST_TMP_FILE: &str = "MANIFEST.tmp";

/// Handle on a store directory's manifest
#[derive(Debug)]
pub struct Manifest {
    dir: PathBuf,
}

impl Manifest {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_TMP_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Read the table names, oldest first. A missing manifest is an empty store.
    pub fn load(&self) -> Result<Vec<String>> {
        let contents = match fs::read_to_string(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for line in contents.lines() {
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            validate_name(name)?;
            if names.iter().any(|n| n == name) {
                return Err(LsmError::Corruption(format!(
                    "manifest lists {} more than once",
                    name
                )));
            }
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// Atomically replace the manifest with `names` (oldest first) and make
    /// the rename durable
    pub fn write(&self, names: &[String]) -> Result<()> {
        self.rewrite(names)?;
        self.sync()
    }

    /// Write `names` to `MANIFEST.tmp` and rename it over `MANIFEST`
    ///
    /// Once this returns `Ok` the new list is the manifest; only the
    /// directory entry may still be unsynced.
    pub fn rewrite(&self, names: &[String]) -> Result<()> {
        for name in names {
            validate_name(name)?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            for name in names {
                file.write_all(name.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }

        fs::rename(&tmp_path, self.path())?;
        Ok(())
    }

    /// Fsync the store directory so the last rename survives a crash
    pub fn sync(&self) -> Result<()> {
        Ok(sync_dir(&self.dir)?)
    }

    /// Remove a temp manifest left behind by a crash mid-rewrite
    pub fn remove_stale_tmp(&self) -> Result<bool> {
        match fs::remove_file(self.tmp_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(LsmError::Corruption(format!(
            "invalid table name in manifest: {:?}",
            name
        )));
    }
    Ok(())
}
