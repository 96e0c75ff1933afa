//! Process tree discovery from `/proc/[pid]/stat` parent links.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use tracing::debug;

use crate::collector::procfs::fields::{Field, FieldSet, FieldSource};
use crate::collector::traits::FileSystem;

/// How far below the target the aggregation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeDepth {
    /// Direct children only.
    Children,
    /// Every transitive descendant.
    #[default]
    Descendants,
}

/// Read-only view of the process table under a proc root.
pub struct ProcessTree<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    proc_path: &'a Path,
}

impl<'a, F: FileSystem + ?Sized> ProcessTree<'a, F> {
    pub fn new(fs: &'a F, proc_path: &'a Path) -> Self {
        Self { fs, proc_path }
    }

    /// Whether `/proc/[pid]/stat` is present.
    pub fn exists(&self, pid: u32) -> bool {
        self.fs
            .exists(&self.proc_path.join(FieldSource::ProcessStat(pid).relative_path()))
    }

    /// Parent pid from field 4 of `/proc/[pid]/stat`.
    ///
    /// `None` if the process has exited or its stat line is malformed.
    pub fn parent_of(&self, pid: u32) -> Option<u32> {
        let set = FieldSet::read(self.fs, self.proc_path, FieldSource::ProcessStat(pid)).ok()?;
        let ppid = set.u64_at(Field::ParentPid).ok()?;
        u32::try_from(ppid).ok()
    }

    /// Numeric entries of the proc root.
    pub fn pids(&self) -> Vec<u32> {
        let entries = match self.fs.read_dir(self.proc_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %self.proc_path.display(), error = %e, "cannot list processes");
                return Vec::new();
            }
        };

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|p| p.file_name()?.to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Parent of every live process, from one scan of the proc root.
    ///
    /// Processes that exit during the scan are left out.
    pub fn parent_map(&self) -> BTreeMap<u32, u32> {
        self.pids()
            .into_iter()
            .filter_map(|pid| Some((pid, self.parent_of(pid)?)))
            .collect()
    }

    /// Processes whose parent is `pid`.
    pub fn children_of(&self, pid: u32) -> BTreeSet<u32> {
        self.parent_map()
            .into_iter()
            .filter(|&(child, ppid)| ppid == pid && child != pid)
            .map(|(child, _)| child)
            .collect()
    }

    /// Every process below `pid`, walked breadth-first over one scan.
    pub fn descendants_of(&self, pid: u32) -> BTreeSet<u32> {
        let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (child, ppid) in self.parent_map() {
            children.entry(ppid).or_default().push(child);
        }

        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([pid]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).into_iter().flatten() {
                // The insert check keeps a malformed cycle from looping.
                if child != pid && found.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        found
    }

    /// Children or descendants of `pid` according to `depth`.
    pub fn resolve(&self, pid: u32, depth: TreeDepth) -> BTreeSet<u32> {
        let set = match depth {
            TreeDepth::Children => self.children_of(pid),
            TreeDepth::Descendants => self.descendants_of(pid),
        };
        debug!(pid, ?depth, count = set.len(), "resolved process tree");
        set
    }
}
