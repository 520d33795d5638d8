//! Size-based rolling log files.
//!
//! # Layout
//! ```text
//! logs/app.log        active file
//! logs/app.log.1      newest backup (app.log.1.zip when compressed)
//! logs/app.log.2
//! ...
//! logs/app.log.N      oldest backup, evicted on the next rotation
//! ```
//!
//! # Design Decisions
//! - A rotation happens when the next line would push the active file past
//!   `max_bytes`. An empty file is never rotated, so an oversized line is
//!   still written.
//! - A `RollingFile` has exactly one owner (the sink's writer thread), so a
//!   rotation and a write never interleave.
//! - With compression on, the rotated file is renamed to a staging name and
//!   queued. Archiving (shift backups, zip) runs later through
//!   [`LineTarget::idle`], when no lines are waiting.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use super::appender::LineTarget;

/// Rotation thresholds for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Maximum size of the active file in bytes.
    pub max_bytes: u64,
    /// Number of backups kept. 0 = the active file is truncated on rotation.
    pub backups: usize,
    /// Archive rotated files as `<name>.N.zip`.
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            backups: 5,
            compress: true,
        }
    }
}

/// An append-only file that rotates itself by size.
pub struct RollingFile {
    path: PathBuf,
    policy: RotationPolicy,
    writer: Option<BufWriter<File>>,
    size: u64,
    /// Rotated files waiting to be archived, oldest first.
    staged: VecDeque<PathBuf>,
    staging_seq: u64,
}

impl RollingFile {
    /// Open (or create) the file at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            policy,
            writer: Some(BufWriter::new(file)),
            size,
            staged: VecDeque::new(),
            staging_seq: 0,
        })
    }

    /// Append one line (a newline is added). Rotates first if needed.
    ///
    /// Bytes stay buffered until [`flush`](Self::flush) or the next rotation.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let incoming = line.len() as u64 + 1;
        if self.size > 0 && self.size + incoming > self.policy.max_bytes {
            self.rotate()?;
        }

        if self.writer.is_none() {
            // a previous rotation failed half way
            let file = open_append(&self.path)?;
            self.size = file.metadata()?.len();
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        self.size += incoming;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Archive every staged rotation.
    pub fn archive_pending(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        while !self.staged.is_empty() {
            if let Err(e) = self.archive_next() {
                result = Err(e);
            }
        }
        result
    }

    /// Existing backups, newest first.
    pub fn backups(&self) -> Vec<PathBuf> {
        (1..=self.policy.backups)
            .filter_map(|index| {
                [false, true]
                    .into_iter()
                    .map(|compressed| backup_path(&self.path, index, compressed))
                    .find(|p| p.exists())
            })
            .collect()
    }

    fn archive_next(&mut self) -> io::Result<()> {
        match self.staged.pop_front() {
            Some(staging) => archive(&self.path, self.policy.backups, &staging),
            None => Ok(()),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        if self.policy.backups == 0 {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
            self.size = 0;
            return Ok(());
        }

        if self.policy.compress {
            self.staging_seq += 1;
            let staging = suffixed(
                &self.path,
                &format!("{}-{}.pending", std::process::id(), self.staging_seq),
            );
            fs::rename(&self.path, &staging)?;
            self.staged.push_back(staging);
        } else {
            shift_backups(&self.path, self.policy.backups)?;
            fs::rename(&self.path, backup_path(&self.path, 1, false))?;
        }

        self.writer = Some(BufWriter::new(open_append(&self.path)?));
        self.size = 0;
        Ok(())
    }
}

impl LineTarget for RollingFile {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        RollingFile::write_line(self, line)
    }

    fn flush(&mut self) -> io::Result<()> {
        RollingFile::flush(self)
    }

    fn has_deferred(&self) -> bool {
        !self.staged.is_empty()
    }

    fn idle(&mut self) -> io::Result<()> {
        self.archive_next()
    }
}

impl Drop for RollingFile {
    fn drop(&mut self) {
        let _ = self.flush();
        // archive failures keep the plain backup
        let _ = self.archive_pending();
    }
}

fn archive(base: &Path, backups: usize, staging: &Path) -> io::Result<()> {
    shift_backups(base, backups)?;
    let target = backup_path(base, 1, true);
    match compress_file(staging, &target, base) {
        Ok(()) => fs::remove_file(staging),
        Err(e) => {
            let _ = fs::remove_file(&target);
            fs::rename(staging, backup_path(base, 1, false))?;
            Err(e)
        }
    }
}

fn compress_file(src: &Path, dst: &Path, base: &Path) -> io::Result<()> {
    let entry_name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    let mut input = File::open(src)?;
    let mut zip = zip::ZipWriter::new(File::create(dst)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(entry_name, options).map_err(io::Error::other)?;
    io::copy(&mut input, &mut zip)?;
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Move backup N to N+1 for every slot, evicting the last one.
fn shift_backups(base: &Path, backups: usize) -> io::Result<()> {
    for index in (1..=backups).rev() {
        for compressed in [false, true] {
            let src = backup_path(base, index, compressed);
            if !src.exists() {
                continue;
            }
            if index == backups {
                fs::remove_file(&src)?;
            } else {
                fs::rename(&src, backup_path(base, index + 1, compressed))?;
            }
        }
    }
    Ok(())
}

/// `app.log` → `app.log.3` / `app.log.3.zip`.
fn backup_path(base: &Path, index: usize, compressed: bool) -> PathBuf {
    if compressed {
        suffixed(base, &format!("{}.zip", index))
    } else {
        suffixed(base, &index.to_string())
    }
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::appender::LineTarget;
    use std::io::Read;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn policy(max_bytes: u64, backups: usize) -> RotationPolicy {
        RotationPolicy {
            max_bytes,
            backups,
            compress: false,
        }
    }

    #[test]
    fn test_backup_path_naming() {
        let base = Path::new("/var/log/app.log");
        assert_eq!(backup_path(base, 1, false), PathBuf::from("/var/log/app.log.1"));
        assert_eq!(backup_path(base, 2, true), PathBuf::from("/var/log/app.log.2.zip"));
    }

    #[test]
    fn test_creates_parent_dirs_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");
        let mut file = RollingFile::open(&path, policy(1024, 3)).unwrap();
        file.write_line("one").unwrap();
        file.write_line("two").unwrap();
        file.flush().unwrap();
        assert_eq!(read(&path), "one\ntwo\n");
        assert!(file.backups().is_empty());
    }

    #[test]
    fn test_exceeding_max_bytes_rotates_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RollingFile::open(&path, policy(64, 3)).unwrap();

        // 20 bytes + newline each; three lines fit in 64
        let line = "x".repeat(20);
        for _ in 0..3 {
            file.write_line(&line).unwrap();
        }
        assert!(file.backups().is_empty());

        file.write_line("fourth").unwrap();
        file.flush().unwrap();
        let backups = file.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(read(&path), "fourth\n");
        assert_eq!(read(&backups[0]).lines().count(), 3);
    }

    #[test]
    fn test_oldest_backup_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RollingFile::open(&path, policy(10, 2)).unwrap();

        // every line fills the file, so each write after the first rotates
        for i in 0..6 {
            file.write_line(&format!("line-{i:04}")).unwrap();
        }
        file.flush().unwrap();

        let backups = file.backups();
        assert_eq!(backups.len(), 2);
        assert_eq!(read(&path), "line-0005\n");
        assert_eq!(read(&backups[0]), "line-0004\n");
        assert_eq!(read(&backups[1]), "line-0003\n");
        assert!(!backup_path(&path, 3, false).exists());
    }

    #[test]
    fn test_zero_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RollingFile::open(&path, policy(10, 0)).unwrap();
        file.write_line("aaaaaaaa").unwrap();
        file.write_line("bbbbbbbb").unwrap();
        file.flush().unwrap();
        assert_eq!(read(&path), "bbbbbbbb\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_oversized_line_on_empty_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RollingFile::open(&path, policy(4, 2)).unwrap();
        file.write_line("much longer than four bytes").unwrap();
        file.flush().unwrap();
        assert!(file.backups().is_empty());
        assert!(read(&path).starts_with("much longer"));
    }

    #[test]
    fn test_compressed_backups_are_zip_archives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = RollingFile::open(
            &path,
            RotationPolicy {
                max_bytes: 16,
                backups: 2,
                compress: true,
            },
        )
        .unwrap();

        file.write_line("first-line-0001").unwrap();
        file.write_line("second-line-002").unwrap();
        file.write_line("third-line-0003").unwrap();
        assert!(file.has_deferred());
        file.archive_pending().unwrap();
        assert!(!file.has_deferred());

        let backups = file.backups();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(|p| p.extension().unwrap() == "zip"));

        let mut archive = zip::ZipArchive::new(File::open(&backups[0]).unwrap()).unwrap();
        let mut content = String::new();
        archive.by_index(0).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "second-line-002\n");

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".pending"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
