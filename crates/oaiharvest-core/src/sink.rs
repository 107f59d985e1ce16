//! Staged file writer with atomic tmp→rename

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Suffix of in-progress files; anything carrying it is never a finished output
pub const TMP_SUFFIX: &str = "tmp";

/// Buffered writer that only becomes visible at `final_path` on [`commit`](Self::commit).
///
/// Dropping an uncommitted `StagedFile` deletes the tmp file, so an aborted
/// write never leaves a partial output behind.
pub struct StagedFile {
    writer: Option<BufWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("final_path", &self.final_path)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl StagedFile {
    /// Open `<final_path>.tmp` for writing, replacing any stale tmp file.
    pub fn create(final_path: impl Into<PathBuf>) -> io::Result<Self> {
        let final_path = final_path.into();
        let mut tmp_name = final_path.as_os_str().to_os_string();
        tmp_name.push(".");
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            tmp_path,
            final_path,
            bytes_written: 0,
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        writer.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush and fsync the tmp file; the final path is untouched.
    pub fn sync(&mut self) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Flush, fsync, and atomically rename tmp → final (replacing any previous file).
    pub fn commit(mut self) -> io::Result<u64> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        let result = finish(writer, &self.tmp_path, &self.final_path);
        if result.is_err() {
            let _ = fs::remove_file(&self.tmp_path);
        }
        result.map(|()| self.bytes_written)
    }

    /// Drop the staged content without touching `final_path`.
    pub fn discard(self) {
        drop(self);
    }
}

fn finish(writer: BufWriter<File>, tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp_path, final_path)
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!(
                        "Failed to remove staged file {}: {e}",
                        self.tmp_path.display()
                    );
                }
            }
        }
    }
}

/// Write `bytes` to `path` atomically (tmp file + rename).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<u64> {
    let mut staged = StagedFile::create(path)?;
    staged.write_all(bytes)?;
    staged.commit()
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == TMP_SUFFIX) {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_makes_file_visible() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"<a/>").unwrap();
        assert!(!target.exists());
        assert!(dir.path().join("out.xml.tmp").exists());

        assert_eq!(staged.commit().unwrap(), 4);
        assert_eq!(fs::read(&target).unwrap(), b"<a/>");
        assert!(!dir.path().join("out.xml.tmp").exists());
    }

    #[test]
    fn sync_writes_tmp_only() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"<a/>").unwrap();
        staged.sync().unwrap();
        assert_eq!(fs::read(dir.path().join("out.xml.tmp")).unwrap(), b"<a/>");
        assert!(!target.exists());
        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"<a/>");
    }

    #[test]
    fn drop_without_commit_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        {
            let mut staged = StagedFile::create(&target).unwrap();
            staged.write_all(b"partial").unwrap();
        }
        assert!(!target.exists());
        assert!(!dir.path().join("out.xml.tmp").exists());
    }

    #[test]
    fn discard_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        fs::write(&target, b"previous").unwrap();
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"new").unwrap();
        staged.discard();
        assert_eq!(fs::read(&target).unwrap(), b"previous");
    }

    #[test]
    fn commit_overwrites_previous_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        write_atomic(&target, b"first run, longer content").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn create_replaces_stale_tmp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.xml");
        fs::write(dir.path().join("out.xml.tmp"), b"stale garbage").unwrap();
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"fresh").unwrap();
        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xml.tmp"), b"stale").unwrap();
        fs::write(dir.path().join("b.xml"), b"keep").unwrap();
        fs::write(dir.path().join("c.tmp"), b"stale2").unwrap();

        assert_eq!(cleanup_tmp_files(dir.path()).unwrap(), 2);

        assert!(!dir.path().join("a.xml.tmp").exists());
        assert!(dir.path().join("b.xml").exists());
        assert!(!dir.path().join("c.tmp").exists());
    }
}
