//! Positional access to `/proc` pseudo-files.
//!
//! A [`FieldSource`] names one kind of pseudo-file: it knows the file's path
//! relative to the proc root and where each [`Field`] lives inside it. A
//! [`FieldSet`] is one read of that file, tokenised and, for files that
//! interleave several subjects, partitioned per subject.
//!
//! Field positions follow `man 5 proc`. Newer kernels only append fields, so
//! the offsets used here stay valid as the lines grow.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::collector::procfs::parser::{
    split_diskstats_line, split_labeled_line, split_net_dev_line, tokenize, tokenize_proc_stat,
};
use crate::collector::traits::FileSystem;

/// Semantic name of a value inside a pseudo-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `/proc/stat` aggregate cpu line, column 1.
    User,
    /// `/proc/stat` aggregate cpu line, column 2.
    Nice,
    /// `/proc/stat` aggregate cpu line, column 3.
    System,
    /// `/proc/stat` aggregate cpu line, column 4.
    Idle,
    /// `/proc/[pid]/stat` field 4.
    ParentPid,
    /// `/proc/[pid]/stat` field 14.
    Utime,
    /// `/proc/[pid]/stat` field 15.
    Stime,
    /// `/proc/[pid]/stat` field 16.
    Cutime,
    /// `/proc/[pid]/stat` field 17.
    Cstime,
    /// `/proc/meminfo` `MemTotal` (kB).
    MemTotal,
    /// `/proc/meminfo` `MemAvailable` (kB).
    MemAvailable,
    /// `/proc/[pid]/status` `VmRSS` (kB).
    VmRss,
    /// `/proc/net/dev` receive bytes, per interface.
    RxBytes,
    /// `/proc/net/dev` transmit bytes, per interface.
    TxBytes,
    /// `/proc/diskstats` sectors read, per device.
    ReadSectors,
    /// `/proc/diskstats` sectors written, per device.
    WriteSectors,
    /// `/proc/[pid]/io` `rchar` (bytes).
    Rchar,
    /// `/proc/[pid]/io` `wchar` (bytes).
    Wchar,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::User => "user",
            Field::Nice => "nice",
            Field::System => "system",
            Field::Idle => "idle",
            Field::ParentPid => "ppid",
            Field::Utime => "utime",
            Field::Stime => "stime",
            Field::Cutime => "cutime",
            Field::Cstime => "cstime",
            Field::MemTotal => "MemTotal",
            Field::MemAvailable => "MemAvailable",
            Field::VmRss => "VmRSS",
            Field::RxBytes => "rx_bytes",
            Field::TxBytes => "tx_bytes",
            Field::ReadSectors => "read_sectors",
            Field::WriteSectors => "write_sectors",
            Field::Rchar => "rchar",
            Field::Wchar => "wchar",
        };
        f.write_str(name)
    }
}

/// Where a [`Field`] lives inside a [`FieldSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Index into the flat token list.
    Token(usize),
    /// Index into the tokens following a fixed label (`MemTotal:` ...).
    Labeled(&'static str, usize),
    /// Index into the tokens of a caller-chosen subject (interface, device).
    Column(usize),
}

/// One kind of pseudo-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// `/proc/stat`
    SystemStat,
    /// `/proc/[pid]/stat`
    ProcessStat(u32),
    /// `/proc/[pid]/status`
    ProcessStatus(u32),
    /// `/proc/meminfo`
    MemInfo,
    /// `/proc/net/dev`, or `/proc/[pid]/net/dev` for a process's namespace view.
    NetDev(Option<u32>),
    /// `/proc/diskstats`
    DiskStats,
    /// `/proc/[pid]/io`
    ProcessIo(u32),
}

impl FieldSource {
    /// Path of the file relative to the proc root.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            FieldSource::SystemStat => PathBuf::from("stat"),
            FieldSource::ProcessStat(pid) => PathBuf::from(format!("{}/stat", pid)),
            FieldSource::ProcessStatus(pid) => PathBuf::from(format!("{}/status", pid)),
            FieldSource::MemInfo => PathBuf::from("meminfo"),
            FieldSource::NetDev(None) => PathBuf::from("net/dev"),
            FieldSource::NetDev(Some(pid)) => PathBuf::from(format!("{}/net/dev", pid)),
            FieldSource::DiskStats => PathBuf::from("diskstats"),
            FieldSource::ProcessIo(pid) => PathBuf::from(format!("{}/io", pid)),
        }
    }

    /// Maps a field id to its location in this kind of file.
    ///
    /// Returns `None` when the field does not belong to this file.
    pub fn locate(&self, field: Field) -> Option<Location> {
        use Field::*;
        match (self, field) {
            // "cpu  user nice system idle iowait ..."
            (FieldSource::SystemStat, User) => Some(Location::Token(1)),
            (FieldSource::SystemStat, Nice) => Some(Location::Token(2)),
            (FieldSource::SystemStat, System) => Some(Location::Token(3)),
            (FieldSource::SystemStat, Idle) => Some(Location::Token(4)),

            (FieldSource::ProcessStat(_), ParentPid) => Some(Location::Token(3)),
            (FieldSource::ProcessStat(_), Utime) => Some(Location::Token(13)),
            (FieldSource::ProcessStat(_), Stime) => Some(Location::Token(14)),
            (FieldSource::ProcessStat(_), Cutime) => Some(Location::Token(15)),
            (FieldSource::ProcessStat(_), Cstime) => Some(Location::Token(16)),

            (FieldSource::ProcessStatus(_), VmRss) => Some(Location::Labeled("VmRSS", 0)),

            (FieldSource::MemInfo, MemTotal) => Some(Location::Labeled("MemTotal", 0)),
            (FieldSource::MemInfo, MemAvailable) => Some(Location::Labeled("MemAvailable", 0)),

            (FieldSource::NetDev(_), RxBytes) => Some(Location::Column(0)),
            (FieldSource::NetDev(_), TxBytes) => Some(Location::Column(8)),

            // Columns after the device name: reads r_merged r_sectors r_time writes w_merged w_sectors
            (FieldSource::DiskStats, ReadSectors) => Some(Location::Column(2)),
            (FieldSource::DiskStats, WriteSectors) => Some(Location::Column(6)),

            (FieldSource::ProcessIo(_), Rchar) => Some(Location::Labeled("rchar", 0)),
            (FieldSource::ProcessIo(_), Wchar) => Some(Location::Labeled("wchar", 0)),

            _ => None,
        }
    }

    fn layout(&self) -> Layout {
        match self {
            FieldSource::SystemStat => Layout::Flat,
            FieldSource::ProcessStat(_) => Layout::ProcessStat,
            FieldSource::ProcessStatus(_) | FieldSource::MemInfo | FieldSource::ProcessIo(_) => {
                Layout::Labeled
            }
            FieldSource::NetDev(_) => Layout::NetDev,
            FieldSource::DiskStats => Layout::DiskStats,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Flat,
    ProcessStat,
    Labeled,
    NetDev,
    DiskStats,
}

/// Error reading or addressing a pseudo-file.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The file does not exist (or its process exited).
    NotFound(PathBuf),
    /// The file exists but may not be read.
    PermissionDenied(PathBuf),
    /// The file is empty or its content does not fit the expected layout.
    Malformed { path: PathBuf, reason: String },
    /// The file has fewer values than the field's position requires.
    OutOfRange {
        path: PathBuf,
        field: Field,
        len: usize,
    },
}

impl ReadError {
    fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ReadError::PermissionDenied(path.to_path_buf()),
            // ESRCH: the process went away while the file was open.
            _ if e.raw_os_error() == Some(3) => ReadError::NotFound(path.to_path_buf()),
            _ => ReadError::Malformed {
                path: path.to_path_buf(),
                reason: format!("read failed: {}", e),
            },
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::NotFound(path) => write!(f, "{} not found", path.display()),
            ReadError::PermissionDenied(path) => {
                write!(f, "{}: permission denied", path.display())
            }
            ReadError::Malformed { path, reason } => {
                write!(f, "{}: malformed: {}", path.display(), reason)
            }
            ReadError::OutOfRange { path, field, len } => write!(
                f,
                "{}: field {} out of range ({} values)",
                path.display(),
                field,
                len
            ),
        }
    }
}

impl std::error::Error for ReadError {}

/// One tokenised read of a pseudo-file.
///
/// `tokens` holds the flat whitespace split of the file. `keyed` holds the
/// per-subject partition for files that have one: the tokens that follow a
/// label, an interface name or a device name.
#[derive(Debug, Clone)]
pub struct FieldSet {
    source: FieldSource,
    path: PathBuf,
    tokens: Vec<String>,
    keyed: BTreeMap<String, Vec<String>>,
}

impl FieldSet {
    /// Reads `source` under `proc_path`, keeping every subject.
    pub fn read<F: FileSystem + ?Sized>(
        fs: &F,
        proc_path: &Path,
        source: FieldSource,
    ) -> Result<Self, ReadError> {
        Self::read_filtered(fs, proc_path, source, |_| true)
    }

    /// Reads `source` under `proc_path`, indexing only the subjects for which
    /// `keep` returns `true`.
    ///
    /// The filter applies to per-subject files (`net/dev`, `diskstats`);
    /// labelled files always keep every label.
    pub fn read_filtered<F, K>(
        fs: &F,
        proc_path: &Path,
        source: FieldSource,
        keep: K,
    ) -> Result<Self, ReadError>
    where
        F: FileSystem + ?Sized,
        K: Fn(&str) -> bool,
    {
        let path = proc_path.join(source.relative_path());
        let content = fs
            .read_to_string(&path)
            .map_err(|e| ReadError::from_io(&path, e))?;
        trace!(path = %path.display(), bytes = content.len(), "read pseudo-file");

        Self::from_content(source, path, &content, keep)
    }

    /// Builds a field set from already-read content.
    pub fn from_content<K>(
        source: FieldSource,
        path: PathBuf,
        content: &str,
        keep: K,
    ) -> Result<Self, ReadError>
    where
        K: Fn(&str) -> bool,
    {
        if content.trim().is_empty() {
            return Err(ReadError::Malformed {
                path,
                reason: "empty file".to_string(),
            });
        }

        let mut keyed = BTreeMap::new();
        let tokens = match source.layout() {
            Layout::Flat => {
                let tokens = tokenize(content);
                if tokens.first().map(String::as_str) != Some("cpu") {
                    return Err(ReadError::Malformed {
                        path,
                        reason: "first line is not the aggregate cpu line".to_string(),
                    });
                }
                tokens
            }
            Layout::ProcessStat => {
                tokenize_proc_stat(content).map_err(|e| ReadError::Malformed {
                    path: path.clone(),
                    reason: e.message,
                })?
            }
            Layout::Labeled => {
                for line in content.lines() {
                    if let Some((key, values)) = split_labeled_line(line) {
                        keyed.insert(key.to_string(), values);
                    }
                }
                tokenize(content)
            }
            Layout::NetDev => {
                for line in content.lines() {
                    if let Some((name, values)) = split_net_dev_line(line)
                        && keep(name)
                    {
                        keyed.insert(name.to_string(), values);
                    }
                }
                tokenize(content)
            }
            Layout::DiskStats => {
                for line in content.lines() {
                    if let Some((name, values)) = split_diskstats_line(line)
                        && keep(name)
                    {
                        keyed.insert(name.to_string(), values);
                    }
                }
                tokenize(content)
            }
        };

        Ok(Self {
            source,
            path,
            tokens,
            keyed,
        })
    }

    /// The kind of file this set was read from.
    pub fn source(&self) -> FieldSource {
        self.source
    }

    /// Absolute path the set was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subjects (or labels) present in the partition, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keyed.keys().map(String::as_str)
    }

    /// Whether the partition has an entry for `key`.
    pub fn has_key(&self, key: &str) -> bool {
        self.keyed.contains_key(key)
    }

    /// Returns the raw token for a positional or labelled field.
    pub fn value_at(&self, field: Field) -> Result<&str, ReadError> {
        match self.location(field)? {
            Location::Token(index) => self.tokens.get(index).map(String::as_str).ok_or_else(|| {
                ReadError::OutOfRange {
                    path: self.path.clone(),
                    field,
                    len: self.tokens.len(),
                }
            }),
            Location::Labeled(label, index) => self.column(label, index, field),
            Location::Column(_) => Err(ReadError::Malformed {
                path: self.path.clone(),
                reason: format!("field {} is per-subject and needs a key", field),
            }),
        }
    }

    /// Returns the raw token for a per-subject field of `key`.
    pub fn keyed_value(&self, key: &str, field: Field) -> Result<&str, ReadError> {
        match self.location(field)? {
            Location::Column(index) => self.column(key, index, field),
            _ => self.value_at(field),
        }
    }

    /// Parses a positional or labelled field as `u64`.
    pub fn u64_at(&self, field: Field) -> Result<u64, ReadError> {
        self.parse_u64(self.value_at(field)?, field)
    }

    /// Parses a per-subject field of `key` as `u64`.
    pub fn keyed_u64(&self, key: &str, field: Field) -> Result<u64, ReadError> {
        self.parse_u64(self.keyed_value(key, field)?, field)
    }

    /// Sums a per-subject field over every indexed subject.
    ///
    /// An empty partition sums to zero.
    pub fn sum_keyed(&self, field: Field) -> Result<u64, ReadError> {
        self.keyed.keys().try_fold(0u64, |acc, key| {
            Ok(acc.saturating_add(self.keyed_u64(key, field)?))
        })
    }

    fn location(&self, field: Field) -> Result<Location, ReadError> {
        self.source
            .locate(field)
            .ok_or_else(|| ReadError::Malformed {
                path: self.path.clone(),
                reason: format!("field {} does not belong to {:?}", field, self.source),
            })
    }

    fn column(&self, key: &str, index: usize, field: Field) -> Result<&str, ReadError> {
        let values = self.keyed.get(key).ok_or_else(|| ReadError::OutOfRange {
            path: self.path.clone(),
            field,
            len: 0,
        })?;
        values
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ReadError::OutOfRange {
                path: self.path.clone(),
                field,
                len: values.len(),
            })
    }

    fn parse_u64(&self, raw: &str, field: Field) -> Result<u64, ReadError> {
        raw.parse().map_err(|_| ReadError::Malformed {
            path: self.path.clone(),
            reason: format!("invalid {}: {:?}", field, raw),
        })
    }
}
