//! In-memory mock filesystem for testing collectors without real `/proc`.
//!
//! Files may carry several versions. Every read returns the version selected
//! by a shared generation counter, so a test can model the "before" and
//! "after" sides of a sampling period by calling [`MockFs::advance`] from the
//! pause hook of [`Metrics`](crate::metrics::Metrics).

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory filesystem for testing.
///
/// Clones share the generation counter, so advancing one clone advances all.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file versions. `None` marks a generation in which
    /// the file is absent (e.g. the process has exited).
    files: HashMap<PathBuf, Vec<Option<String>>>,
    /// Map from symlink path to its target.
    links: HashMap<PathBuf, PathBuf>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    generation: Arc<AtomicUsize>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the same content in every generation.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let content: String = content.into();
        self.add_file_versions(path, [Some(content)]);
    }

    /// Adds a file whose content changes with the generation.
    ///
    /// Generation `n` reads version `n`; generations past the last version
    /// keep reading the last one.
    pub fn add_file_versions<S: Into<String>>(
        &mut self,
        path: impl AsRef<Path>,
        versions: impl IntoIterator<Item = Option<S>>,
    ) {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let versions = versions.into_iter().map(|v| v.map(Into::into)).collect();
        self.files.insert(path, versions);
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let mut current = Some(path.as_ref());
        while let Some(p) = current {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            current = p.parent();
        }
    }

    /// Adds a symbolic link.
    pub fn add_link(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.links.insert(path, target.as_ref().to_path_buf());
    }

    /// Adds a process with its `/proc/[pid]/` accounting files.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `stat` - Versions of `/proc/[pid]/stat`
    /// * `status` - Content of `/proc/[pid]/status`
    /// * `io` - Versions of `/proc/[pid]/io` (empty if not accessible)
    /// * `netns` - Target of `/proc/[pid]/ns/net`
    pub fn add_process<S: Into<String>>(
        &mut self,
        pid: u32,
        stat: impl IntoIterator<Item = S>,
        status: &str,
        io: impl IntoIterator<Item = S>,
        netns: &str,
    ) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file_versions(base.join("stat"), stat.into_iter().map(Some));
        self.add_file(base.join("status"), status);

        let io: Vec<Option<String>> = io.into_iter().map(|v| Some(v.into())).collect();
        if !io.is_empty() {
            self.add_file_versions(base.join("io"), io);
        }
        self.add_link(base.join("ns/net"), netns);
    }

    /// Adds `/sys/class/net/[name]/flags`.
    pub fn add_interface(&mut self, name: &str, flags: u32) {
        self.add_file(
            format!("/sys/class/net/{}/flags", name),
            format!("{:#x}\n", flags),
        );
    }

    /// Adds `/sys/block/[name]`, with `queue/hw_sector_size` when given.
    pub fn add_block_device(&mut self, name: &str, sector_size: Option<u64>) {
        let base = PathBuf::from(format!("/sys/block/{}", name));
        self.add_dir(&base);
        if let Some(size) = sector_size {
            self.add_file(base.join("queue/hw_sector_size"), format!("{}\n", size));
        }
    }

    /// Moves every versioned file to its next version.
    pub fn advance(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current generation.
    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::SeqCst)
    }

    /// Loads a mock filesystem from a directory snapshot, mounted at `mount`.
    ///
    /// This is useful for regression tests with real `/proc` or `/sys`
    /// snapshots. Symlinks are kept as links, not followed.
    pub fn from_snapshot(dir: &Path, mount: &Path) -> io::Result<Self> {
        let mut fs = Self::new();
        load_directory_recursive(&mut fs, dir, mount)?;
        Ok(fs)
    }

    fn current(&self, path: &Path) -> Option<&String> {
        let versions = self.files.get(path)?;
        let index = self.generation().min(versions.len().checked_sub(1)?);
        versions[index].as_ref()
    }
}

fn load_directory_recursive(
    fs: &mut MockFs,
    real_path: &Path,
    virtual_path: &Path,
) -> io::Result<()> {
    fs.add_dir(virtual_path);

    for entry in std::fs::read_dir(real_path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let real_child = entry.path();
        let virtual_child = virtual_path.join(entry.file_name());

        if file_type.is_symlink() {
            fs.add_link(&virtual_child, std::fs::read_link(&real_child)?);
        } else if file_type.is_dir() {
            load_directory_recursive(fs, &real_child, &virtual_child)?;
        } else if file_type.is_file() {
            // Try to read as string, skip binary files
            if let Ok(content) = std::fs::read_to_string(&real_child) {
                fs.add_file(&virtual_child, content);
            }
        }
    }
    Ok(())
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found: {:?}", what, path),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.current(path)
            .cloned()
            .ok_or_else(|| not_found("file", path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.current(path).is_some()
            || self.links.contains_key(path)
            || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(not_found("directory", path));
        }

        let is_child = |p: &Path| p.parent().is_some_and(|parent| parent == path);
        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if is_child(file_path) && self.current(file_path).is_some() {
                entries.insert(file_path.clone());
            }
        }
        for link_path in self.links.keys() {
            if is_child(link_path) {
                entries.insert(link_path.clone());
            }
        }
        for dir_path in &self.directories {
            if is_child(dir_path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.links
            .get(path)
            .cloned()
            .ok_or_else(|| not_found("link", path))
    }
}
