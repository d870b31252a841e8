//! Size-rotated log files.
//!
//! # Responsibilities
//! - Append records to a log file
//! - Roll the file over once it would exceed the size limit
//! - Compress rolled files and prune old backups
//!
//! # Backup Layout
//! ```text
//! server_info.log                              (active)
//! server_info-2024-05-01T10-42-07.118.log.gz   (rolled, compressed)
//! ```
//!
//! # Design Decisions
//! - One write per record; the formatter hands over whole lines
//! - Only the rename happens under the file lock; compression and pruning
//!   run on a background thread so a log call never waits on gzip
//! - Background jobs are chained, so at most one prune runs at a time
//! - Backup timestamps sort lexicographically, newest last

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Limits applied to a rotating file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Roll over once the active file would grow past this many bytes.
    pub max_size_bytes: u64,
    /// Rolled files kept on disk.
    pub max_backups: usize,
    /// Rolled files older than this are deleted.
    pub max_age: Duration,
    /// Gzip rolled files.
    pub compress: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            max_backups: 200,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            compress: true,
        }
    }
}

/// A log file that rotates by size. Cheap to clone; clones share the file.
#[derive(Debug, Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    policy: RotationPolicy,
    file: File,
    size: u64,
    /// Last compress-and-prune job, if not yet joined.
    pending: Option<JoinHandle<()>>,
}

impl RotatingFile {
    /// Open (or create) the active file in append mode.
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                path,
                policy,
                file,
                size,
                pending: None,
            })),
        })
    }

    /// Path of the active file.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Flush and synchronize the active file to durable storage.
    ///
    /// Also waits for outstanding compression and pruning of rolled files.
    pub fn sync(&self) -> io::Result<()> {
        let pending = {
            let mut inner = self.inner.lock();
            inner.file.flush()?;
            inner.file.sync_all()?;
            inner.pending.take()
        };
        if let Some(pending) = pending {
            if pending.join().is_err() {
                eprintln!("log rotation worker panicked");
            }
        }
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        let incoming = buf.len() as u64;
        if inner.size > 0 && inner.size + incoming > inner.policy.max_size_bytes {
            inner.rotate()?;
        }
        inner.file.write_all(buf)?;
        inner.size += incoming;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Inner {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let backup = unused_backup_path(&self.path, Local::now().naive_local());
        fs::rename(&self.path, &backup)?;
        self.file = open_append(&self.path)?;
        self.size = 0;

        let previous = self.pending.take();
        let path = self.path.clone();
        let policy = self.policy;
        let job = thread::Builder::new()
            .name("log-rotation".to_string())
            .spawn(move || {
                if let Some(previous) = previous {
                    let _ = previous.join();
                }
                finish_rotation(&path, &backup, &policy);
            })?;
        self.pending = Some(job);
        Ok(())
    }
}

/// Compress a freshly rolled file and prune old backups.
///
/// Failures go to stderr; the logger cannot log about itself.
fn finish_rotation(path: &Path, backup: &Path, policy: &RotationPolicy) {
    if policy.compress {
        if let Err(e) = compress(backup) {
            // Keep the uncompressed backup rather than lose records
            eprintln!("failed to compress {}: {}", backup.display(), e);
        }
    }
    if let Err(e) = prune(path, policy, Local::now().naive_local()) {
        eprintln!("failed to prune backups of {}: {}", path.display(), e);
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

fn backup_path(path: &Path, now: NaiveDateTime) -> PathBuf {
    let (stem, ext) = split_name(path);
    path.with_file_name(format!("{}-{}{}", stem, now.format(BACKUP_TIME_FORMAT), ext))
}

/// Backup path for `now`, moved forward a millisecond at a time past names
/// already taken by earlier rotations.
fn unused_backup_path(path: &Path, mut now: NaiveDateTime) -> PathBuf {
    loop {
        let backup = backup_path(path, now);
        if !backup.exists() && !gz_path(&backup).exists() {
            return backup;
        }
        now += chrono::Duration::milliseconds(1);
    }
}

fn gz_path(backup: &Path) -> PathBuf {
    let mut gz_name = backup.as_os_str().to_owned();
    gz_name.push(".gz");
    PathBuf::from(gz_name)
}

fn compress(backup: &Path) -> io::Result<()> {
    let target = gz_path(backup);

    let mut source = File::open(backup)?;
    let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?.sync_all()?;
    fs::remove_file(backup)
}

/// Timestamp embedded in a backup name, if `name` is a backup of `path`.
fn backup_timestamp(path: &Path, name: &str) -> Option<NaiveDateTime> {
    let (stem, ext) = split_name(path);
    let rest = name.strip_prefix(&format!("{}-", stem))?;
    let rest = rest.strip_suffix(".gz").unwrap_or(rest);
    let stamp = rest.strip_suffix(ext.as_str())?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()
}

/// Delete backups beyond the count limit or older than the age limit.
fn prune(path: &Path, policy: &RotationPolicy, now: NaiveDateTime) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut backups: Vec<(NaiveDateTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let stamp = backup_timestamp(path, &name.to_string_lossy())?;
            Some((stamp, entry.path()))
        })
        .collect();
    backups.sort_by(|a, b| b.0.cmp(&a.0));

    let max_age = chrono::Duration::from_std(policy.max_age)
        .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
    for (index, (stamp, backup)) in backups.iter().enumerate() {
        let too_many = index >= policy.max_backups;
        let too_old = now.signed_duration_since(*stamp) > max_age;
        if too_many || too_old {
            fs::remove_file(backup)?;
        }
    }
    Ok(())
}
