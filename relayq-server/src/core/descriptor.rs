use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use relayq_protocol::discovery::DESCRIPTOR_EXTENSION;
use relayq_protocol::{descriptor_path, BrokerDescriptor};
use tracing::{info, warn};

use crate::core::error::DescriptorError;

const LOCK_EXTENSION: &str = "lock";

/// Publishes and withdraws broker descriptors under one directory.
///
/// Each published name holds an exclusive advisory lock on `<name>.lock`
/// until it is withdrawn, so a second publish of a live name fails whether
/// it comes from this process or another one. The lock is advisory: a
/// crashed broker leaves its `.json` behind, and readers still have to probe
/// the advertised port.
///
/// Withdraw releases the lock but keeps `<name>.lock` on disk. Deleting it
/// would let a publisher that already opened the old file lock an unlinked
/// inode while another creates a fresh one. There is one lock file per
/// name, reused by every later publish.
pub struct DescriptorStore {
    dir: PathBuf,
    // name -> open lock file; dropping the file releases the lock
    held: Mutex<HashMap<String, File>>,
}

impl DescriptorStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        DescriptorStore {
            dir: dir.as_ref().to_path_buf(),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        descriptor_path(&self.dir, name)
    }

    pub fn publish(&self, descriptor: &BrokerDescriptor) -> Result<PathBuf, DescriptorError> {
        let mut held = self.held();
        if held.contains_key(&descriptor.name) {
            return Err(DescriptorError::AlreadyPublished(descriptor.name.clone()));
        }

        fs::create_dir_all(&self.dir)?;
        let lock = self.acquire_lock(&descriptor.name)?;

        let path = self.path_for(&descriptor.name);
        write_atomic(&path, descriptor)?;
        held.insert(descriptor.name.clone(), lock);

        info!(
            name = %descriptor.name,
            port = %descriptor.port,
            pid = descriptor.pid,
            path = %path.display(),
            "descriptor published"
        );
        Ok(path)
    }

    /// Removes a published descriptor and releases its name lock. A file
    /// that is already gone is only logged.
    pub fn withdraw(&self, path: &Path) -> Result<(), DescriptorError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DescriptorError::InvalidPath(path.to_path_buf()))?
            .to_string();

        let mut held = self.held();
        match fs::remove_file(path) {
            Ok(()) => info!(name = %name, path = %path.display(), "descriptor withdrawn"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(name = %name, path = %path.display(), "descriptor already absent")
            }
            Err(e) => return Err(e.into()),
        }
        held.remove(&name);
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<Option<BrokerDescriptor>, DescriptorError> {
        Ok(BrokerDescriptor::load(&self.path_for(name))?)
    }

    /// Every descriptor in the directory, stale ones included.
    pub fn list(&self) -> Result<Vec<BrokerDescriptor>, DescriptorError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut descriptors = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTOR_EXTENSION) {
                continue;
            }
            match BrokerDescriptor::load(&path) {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable descriptor"),
            }
        }
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    fn acquire_lock(&self, name: &str) -> Result<File, DescriptorError> {
        let lock_path = self.dir.join(format!("{name}.{LOCK_EXTENSION}"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(DescriptorError::AlreadyPublished(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, File>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_atomic(path: &Path, descriptor: &BrokerDescriptor) -> Result<(), DescriptorError> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp_file = File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut tmp_file, descriptor)?;
        tmp_file.flush()?;
    }
    fs::rename(&tmp_path, path)?; // atomic replace
    Ok(())
}
