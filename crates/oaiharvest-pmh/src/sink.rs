//! Filesystem record sink
//!
//! Records stream into `<stem>.xml.tmp`; nothing is visible under the final
//! names until [`SinkHandle::finalize`] renames the files into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use oaiharvest_core::sink::TMP_SUFFIX;
use oaiharvest_core::{Fault, StagedFile};

use crate::key::StorageKey;
use crate::metadata::MetadataDocument;
use crate::model::HarvestRecord;

/// Root of the per-repository output folders.
#[derive(Debug, Clone)]
pub struct RecordSink {
    root: PathBuf,
}

impl RecordSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the key's folder (idempotent) and open a staged record collection.
    pub fn ensure_storage(&self, key: &StorageKey) -> Result<SinkHandle, Fault> {
        let dir = key.dir(&self.root);
        fs::create_dir_all(&dir).map_err(|e| Fault::storage(&dir, e))?;

        // Other sets of the same repository may be writing into this folder,
        // so only this key's own leftovers are touched
        let metadata_path = key.metadata_file(&self.root);
        remove_stale_tmp(&metadata_path)?;

        let records_path = key.records_file(&self.root);
        let records = StagedFile::create(&records_path).map_err(|e| Fault::storage(&records_path, e))?;
        Ok(SinkHandle {
            key: key.clone(),
            records,
            metadata_path,
            metadata: None,
            records_appended: 0,
        })
    }
}

fn remove_stale_tmp(final_path: &Path) -> Result<(), Fault> {
    let mut tmp = final_path.as_os_str().to_os_string();
    tmp.push(".");
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    match fs::remove_file(&tmp) {
        Ok(()) => {
            log::debug!("Removed stale tmp file {}", tmp.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Fault::storage(&tmp, e)),
    }
}

fn stage(path: &Path, bytes: &[u8]) -> io::Result<StagedFile> {
    let mut staged = StagedFile::create(path)?;
    staged.write_all(bytes)?;
    staged.sync()?;
    Ok(staged)
}

/// Scoped write access to one key's output.
///
/// Dropping the handle without [`finalize`](Self::finalize) leaves any
/// previous output untouched.
#[derive(Debug)]
pub struct SinkHandle {
    key: StorageKey,
    records: StagedFile,
    metadata_path: PathBuf,
    metadata: Option<Vec<u8>>,
    records_appended: u64,
}

impl SinkHandle {
    pub fn records_appended(&self) -> u64 {
        self.records_appended
    }

    /// Append one record payload (arrival order is file order).
    pub fn append_record(&mut self, record: &HarvestRecord) -> Result<(), Fault> {
        let path = self.records.final_path().to_path_buf();
        self.records
            .write_all(record.payload.as_bytes())
            .and_then(|()| self.records.write_all(b"\n"))
            .map_err(|e| Fault::storage(&path, e))?;
        self.records_appended += 1;
        Ok(())
    }

    /// Stage the metadata document; written on finalize, replacing any previous one.
    pub fn write_metadata(&mut self, document: &MetadataDocument) -> Result<(), Fault> {
        self.metadata = Some(document.render()?);
        Ok(())
    }

    /// Make the record collection, then the metadata document, visible.
    ///
    /// Both files are written and synced before either rename, so a failed
    /// write leaves the previous output pair in place.
    pub fn finalize(self) -> Result<u64, Fault> {
        let SinkHandle {
            key,
            mut records,
            metadata_path,
            metadata,
            records_appended,
        } = self;
        let records_path = records.final_path().to_path_buf();

        let metadata = metadata
            .map(|bytes| stage(&metadata_path, &bytes))
            .transpose()
            .map_err(|e| Fault::storage(&metadata_path, e))?;
        records
            .sync()
            .map_err(|e| Fault::storage(&records_path, e))?;

        let bytes = records
            .commit()
            .map_err(|e| Fault::storage(&records_path, e))?;
        if let Some(metadata) = metadata {
            metadata
                .commit()
                .map_err(|e| Fault::storage(&metadata_path, e))?;
        }
        log::debug!("{key}: finalized {records_appended} records ({bytes} bytes)");
        Ok(bytes)
    }

    /// Drop staged output, keeping whatever a previous run left.
    pub fn discard(self) {
        self.records.discard();
    }
}
