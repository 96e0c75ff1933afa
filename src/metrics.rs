//! Public metric getters.
//!
//! Every getter runs its own sampling cycle: snapshot, wait one period,
//! snapshot again, then hand both records to [`crate::rates`]. Getters share
//! no mutable state, so any number of them may run on parallel threads over
//! one `&Metrics`; [`Metrics::report`] does exactly that.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, trace};

use crate::collector::devices::DeviceEnv;
use crate::collector::error::MetricError;
use crate::collector::procfs::tree::{ProcessTree, TreeDepth};
use crate::collector::snapshot::SnapshotCollector;
use crate::collector::traits::FileSystem;
use crate::models::{BdStat, CpuStat, NetStat, RamStat, Report, Throughput};
use crate::rates;

/// What to measure and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Target process; 0 measures the whole system only.
    pub pid: u32,
    /// Time between the two snapshots of one metric call.
    pub period: Duration,
    /// Root of the proc filesystem.
    pub proc_path: PathBuf,
    /// Which part of the target's tree is aggregated.
    pub depth: TreeDepth,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            pid: 0,
            period: Duration::from_secs(1),
            proc_path: PathBuf::from("/proc"),
            depth: TreeDepth::default(),
        }
    }
}

type Pause = Box<dyn Fn(Duration) + Send + Sync>;

fn sleep(period: Duration) {
    if !period.is_zero() {
        thread::sleep(period);
    }
}

/// Usage metrics for the system and for one process tree.
///
/// The target's children are resolved once, at construction, and reused by
/// every call. A child that has exited by the time a call samples it is left
/// out of both snapshots of that call.
pub struct Metrics<F: FileSystem, D: DeviceEnv> {
    fs: F,
    devices: D,
    config: MetricsConfig,
    children: BTreeSet<u32>,
    pause: Pause,
}

impl<F: FileSystem, D: DeviceEnv> Metrics<F, D> {
    pub fn new(fs: F, devices: D, config: MetricsConfig) -> Self {
        let children = if config.pid == 0 {
            BTreeSet::new()
        } else {
            ProcessTree::new(&fs, &config.proc_path).resolve(config.pid, config.depth)
        };

        Self {
            fs,
            devices,
            config,
            children,
            pause: Box::new(sleep),
        }
    }

    /// Replaces the wait between the two snapshots of a call.
    ///
    /// The default blocks the calling thread for the period.
    pub fn with_pause(mut self, pause: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn pid(&self) -> u32 {
        self.config.pid
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Processes aggregated into the target's totals.
    pub fn children(&self) -> &BTreeSet<u32> {
        &self.children
    }

    // -----------------------------------------------------------------------
    // CPU
    // -----------------------------------------------------------------------

    /// System-wide CPU usage in percent.
    pub fn general_cpu_usage(&self) -> Result<f64, MetricError> {
        let (before, after) = self.sample_system(|c| c.cpu_snapshot(0))?;
        rates::cpu_percent(&before, &after)
    }

    /// CPU usage of the target and its children, in percent of all CPU time.
    pub fn cpu_usage(&self) -> Result<f64, MetricError> {
        if self.pid() == 0 {
            return self.general_cpu_usage();
        }
        let collector = self.collector();
        let (before, after) = self.sample_tree(
            &self.members(),
            |pid| collector.cpu_snapshot(pid),
            CpuStat::accumulate,
        )?;
        rates::process_cpu_percent(&before, &after)
    }

    // -----------------------------------------------------------------------
    // RAM
    // -----------------------------------------------------------------------

    /// System-wide memory in use, in percent of total.
    pub fn general_ram_usage(&self) -> Result<f64, MetricError> {
        let (_, after) = self.sample_system(|c| c.ram_snapshot(0))?;
        rates::ram_percent(&after)
    }

    /// Resident memory of the target and its children, in percent of total.
    pub fn ram_usage(&self) -> Result<f64, MetricError> {
        if self.pid() == 0 {
            return self.general_ram_usage();
        }
        rates::ram_percent(&self.process_ram()?)
    }

    /// System-wide memory in use, in MB.
    pub fn general_ram_usage_mb(&self) -> Result<u64, MetricError> {
        let (_, after) = self.sample_system(|c| c.ram_snapshot(0))?;
        Ok(rates::ram_megabytes(&after))
    }

    /// Resident memory of the target and its children, in MB.
    pub fn ram_usage_mb(&self) -> Result<u64, MetricError> {
        if self.pid() == 0 {
            return self.general_ram_usage_mb();
        }
        Ok(rates::ram_megabytes(&self.process_ram()?))
    }

    fn process_ram(&self) -> Result<RamStat, MetricError> {
        let collector = self.collector();
        let (_, after) = self.sample_tree(
            &self.members(),
            |pid| collector.ram_snapshot(pid),
            RamStat::accumulate,
        )?;
        Ok(after)
    }

    // -----------------------------------------------------------------------
    // Network
    // -----------------------------------------------------------------------

    /// KB received and sent over all active interfaces during one period.
    pub fn general_net_usage(&self) -> Result<Throughput, MetricError> {
        let (before, after) = self.sample_system(|c| c.net_snapshot(0))?;
        rates::net_delta(&before, &after)
    }

    /// KB received and sent in the network namespaces of the target tree.
    ///
    /// Each namespace is counted once, however many processes share it.
    pub fn net_usage(&self) -> Result<Throughput, MetricError> {
        if self.pid() == 0 {
            return self.general_net_usage();
        }
        self.check_target()?;
        let collector = self.collector();
        let members = self.namespace_members(&collector);
        let (before, after) = self.sample_tree(
            &members,
            |pid| collector.net_snapshot(pid),
            NetStat::accumulate,
        )?;
        rates::net_delta(&before, &after)
    }

    /// The target plus one child per network namespace not already covered.
    fn namespace_members(&self, collector: &SnapshotCollector<'_, F, D>) -> Vec<u32> {
        let pid = self.pid();
        let mut seen = BTreeSet::new();
        if let Ok(ns) = collector.netns_of(pid) {
            seen.insert(ns);
        }

        let mut members = vec![pid];
        for &child in &self.children {
            match collector.netns_of(child) {
                Ok(ns) => {
                    if seen.insert(ns) {
                        members.push(child);
                    }
                }
                Err(e) => debug!(pid = child, error = %e, "skipping child network"),
            }
        }
        members
    }

    // -----------------------------------------------------------------------
    // Block I/O
    // -----------------------------------------------------------------------

    /// KB read and written on all real block devices during one period.
    pub fn general_io_stats(&self) -> Result<Throughput, MetricError> {
        let (before, after) = self.sample_system(|c| c.io_snapshot(0))?;
        rates::io_delta(&before, &after)
    }

    /// KB read and written by the target tree during one period.
    pub fn io_stats(&self) -> Result<Throughput, MetricError> {
        if self.pid() == 0 {
            return self.general_io_stats();
        }
        let collector = self.collector();
        let (before, after) = self.sample_tree(
            &self.members(),
            |pid| collector.io_snapshot(pid),
            BdStat::accumulate,
        )?;
        rates::io_delta(&before, &after)
    }

    // -----------------------------------------------------------------------
    // Report
    // -----------------------------------------------------------------------

    /// Runs every getter on its own thread and collects the results.
    ///
    /// Each getter keeps its own sampling window; the report takes one period
    /// rather than ten.
    pub fn report(&self) -> Report {
        let timestamp = Utc::now();
        thread::scope(|s| {
            let general_cpu = s.spawn(|| self.general_cpu_usage());
            let cpu = s.spawn(|| self.cpu_usage());
            let general_ram = s.spawn(|| self.general_ram_usage());
            let ram = s.spawn(|| self.ram_usage());
            let general_ram_mb = s.spawn(|| self.general_ram_usage_mb());
            let ram_mb = s.spawn(|| self.ram_usage_mb());
            let general_net = s.spawn(|| self.general_net_usage());
            let net = s.spawn(|| self.net_usage());
            let general_io = s.spawn(|| self.general_io_stats());
            let io = s.spawn(|| self.io_stats());

            Report {
                timestamp,
                pid: self.pid(),
                period: self.period(),
                general_cpu: join(general_cpu),
                cpu: join(cpu),
                general_ram: join(general_ram),
                ram: join(ram),
                general_ram_mb: join(general_ram_mb),
                ram_mb: join(ram_mb),
                general_net: join(general_net),
                net: join(net),
                general_io: join(general_io),
                io: join(io),
            }
        })
    }

    // -----------------------------------------------------------------------
    // Sampling
    // -----------------------------------------------------------------------

    fn collector(&self) -> SnapshotCollector<'_, F, D> {
        SnapshotCollector::new(&self.fs, &self.devices, &self.config.proc_path)
    }

    fn members(&self) -> Vec<u32> {
        std::iter::once(self.pid())
            .chain(self.children.iter().copied())
            .collect()
    }

    /// Fails with `ProcessGone` when a target pid is set but not running.
    fn check_target(&self) -> Result<(), MetricError> {
        let pid = self.pid();
        if pid == 0 || ProcessTree::new(&self.fs, &self.config.proc_path).exists(pid) {
            Ok(())
        } else {
            debug!(pid, "target process not found, skipping sample");
            Err(MetricError::ProcessGone(pid))
        }
    }

    fn wait(&self) {
        trace!(period = ?self.config.period, "waiting between snapshots");
        (self.pause)(self.config.period);
    }

    fn sample_system<T, S>(&self, snapshot: S) -> Result<(T, T), MetricError>
    where
        S: Fn(&SnapshotCollector<'_, F, D>) -> Result<T, MetricError>,
    {
        self.check_target()?;
        let collector = self.collector();
        let before = snapshot(&collector)?;
        self.wait();
        let after = snapshot(&collector)?;
        Ok((before, after))
    }

    /// Samples `members` (target first) twice and sums each side.
    ///
    /// The target must be readable in both samples. A child is counted only
    /// if both of its samples succeed.
    fn sample_tree<T, S>(
        &self,
        members: &[u32],
        snapshot: S,
        combine: fn(&mut T, &T),
    ) -> Result<(T, T), MetricError>
    where
        S: Fn(u32) -> Result<T, MetricError>,
    {
        let Some((&target, children)) = members.split_first() else {
            return Err(MetricError::ProcessGone(self.pid()));
        };
        self.check_target()?;

        let mut before = snapshot(target)?;
        let mut before_children = BTreeMap::new();
        for &child in children {
            match snapshot(child) {
                Ok(stat) => {
                    before_children.insert(child, stat);
                }
                Err(e) => debug!(pid = child, error = %e, "child not sampled"),
            }
        }

        self.wait();

        let mut after = snapshot(target)?;
        for (child, child_before) in &before_children {
            match snapshot(*child) {
                Ok(child_after) => {
                    combine(&mut before, child_before);
                    combine(&mut after, &child_after);
                }
                Err(e) => debug!(pid = *child, error = %e, "child exited during sample"),
            }
        }

        Ok((before, after))
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::devices::SysfsDevices;
    use crate::collector::mock::{MockFs, StaticDevices};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type MockMetrics = Metrics<MockFs, SysfsDevices<MockFs>>;

    fn config(pid: u32, depth: TreeDepth) -> MetricsConfig {
        MetricsConfig {
            pid,
            depth,
            period: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Metrics whose wait moves the mock to its "after" generation.
    fn advancing(fs: MockFs, pid: u32, depth: TreeDepth) -> MockMetrics {
        let devices = SysfsDevices::new(fs.clone(), "/sys");
        let hook = fs.clone();
        Metrics::new(fs, devices, config(pid, depth)).with_pause(move |_| hook.advance())
    }

    fn typical(pid: u32) -> MockMetrics {
        advancing(MockFs::typical_system(), pid, TreeDepth::Descendants)
    }

    fn counting(fs: MockFs, pid: u32, period: Duration) -> (MockMetrics, Arc<AtomicUsize>) {
        let devices = SysfsDevices::new(fs.clone(), "/sys");
        let pauses = Arc::new(AtomicUsize::new(0));
        let counter = pauses.clone();
        let metrics = Metrics::new(
            fs,
            devices,
            MetricsConfig {
                pid,
                period,
                ..Default::default()
            },
        )
        .with_pause(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (metrics, pauses)
    }

    #[test]
    fn test_general_cpu_usage() {
        assert_eq!(typical(0).general_cpu_usage().unwrap(), 70.0);
    }

    #[test]
    fn test_cpu_usage_descendants() {
        let metrics = typical(1000);
        assert_eq!(
            metrics.children().iter().copied().collect::<Vec<_>>(),
            [1001, 1002, 1003]
        );
        // (65 - 25) process ticks over 100 system ticks
        assert_eq!(metrics.cpu_usage().unwrap(), 40.0);
    }

    #[test]
    fn test_cpu_usage_direct_children() {
        let metrics = advancing(MockFs::typical_system(), 1000, TreeDepth::Children);
        assert_eq!(metrics.children().len(), 2);
        assert_eq!(metrics.cpu_usage().unwrap(), 30.0);
    }

    #[test]
    fn test_process_getters_without_pid_are_general() {
        assert_eq!(typical(0).cpu_usage().unwrap(), 70.0);
        assert_eq!(typical(0).ram_usage().unwrap(), 75.0);
        assert_eq!(
            typical(0).io_stats().unwrap(),
            typical(0).general_io_stats().unwrap()
        );
    }

    #[test]
    fn test_general_ram() {
        assert_eq!(typical(0).general_ram_usage().unwrap(), 75.0);
        assert_eq!(typical(0).general_ram_usage_mb().unwrap(), 5859);
    }

    #[test]
    fn test_process_ram() {
        // 102400 + 51200 + 51200 + 20480 KB resident
        let pct = typical(1000).ram_usage().unwrap();
        assert!((pct - 2.816).abs() < 1e-9, "{pct}");
        assert_eq!(typical(1000).ram_usage_mb().unwrap(), 220);
    }

    #[test]
    fn test_general_net_usage() {
        assert_eq!(
            typical(0).general_net_usage().unwrap(),
            Throughput {
                read_kb: 100,
                write_kb: 50
            }
        );
    }

    #[test]
    fn test_net_usage_counts_each_namespace_once() {
        // Host namespace once, plus the container's 10 KB.
        assert_eq!(
            typical(1000).net_usage().unwrap(),
            Throughput {
                read_kb: 110,
                write_kb: 50
            }
        );
    }

    #[test]
    fn test_net_usage_counts_container_only_interfaces() {
        let mut fs = MockFs::typical_system();
        let header = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";
        fs.add_file_versions(
            "/proc/1002/net/dev",
            [
                Some(format!(
                    "{header} ceth0:       0        0    0    0    0     0          0         0        0        0    0    0    0     0       0          0\n"
                )),
                Some(format!(
                    "{header} ceth0: 1048576      100    0    0    0     0          0         0        0        0    0    0    0     0       0          0\n"
                )),
            ],
        );

        assert_eq!(
            advancing(fs, 1000, TreeDepth::Descendants)
                .net_usage()
                .unwrap(),
            Throughput {
                read_kb: 100 + 1024,
                write_kb: 50
            }
        );
    }

    #[test]
    fn test_general_io_stats() {
        assert_eq!(
            typical(0).general_io_stats().unwrap(),
            Throughput {
                read_kb: 14,
                write_kb: 20
            }
        );
    }

    #[test]
    fn test_general_io_stats_static_devices() {
        let fs = MockFs::typical_system();
        let hook = fs.clone();
        let metrics = Metrics::new(
            fs,
            StaticDevices::new(["eth0"], ["sda"]),
            config(0, TreeDepth::Descendants),
        )
        .with_pause(move |_| hook.advance());

        assert_eq!(
            metrics.general_io_stats().unwrap(),
            Throughput {
                read_kb: 10,
                write_kb: 20
            }
        );
    }

    #[test]
    fn test_general_io_stats_sector_size_override() {
        let fs = MockFs::typical_system();
        let hook = fs.clone();
        let devices = StaticDevices::new(["eth0"], ["sda"]).with_sector_size("sda", 4096);
        let metrics = Metrics::new(fs, devices, config(0, TreeDepth::Descendants))
            .with_pause(move |_| hook.advance());

        // sda: 20 sectors read, 40 written, 4 KB each
        assert_eq!(
            metrics.general_io_stats().unwrap(),
            Throughput {
                read_kb: 80,
                write_kb: 160
            }
        );
    }

    #[test]
    fn test_io_stats_skips_children_without_io() {
        assert_eq!(
            typical(1000).io_stats().unwrap(),
            Throughput {
                read_kb: 7,
                write_kb: 3
            }
        );
    }

    #[test]
    fn test_missing_target_returns_without_waiting() {
        let (metrics, pauses) = counting(
            MockFs::typical_system(),
            4242,
            Duration::from_secs(10),
        );

        assert!(metrics.children().is_empty());
        assert_eq!(metrics.cpu_usage(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.ram_usage(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.ram_usage_mb(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.net_usage(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.io_stats(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(pauses.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_target_skips_system_getters() {
        let (metrics, pauses) = counting(
            MockFs::typical_system(),
            4242,
            Duration::from_secs(10),
        );

        let gone = Err(MetricError::ProcessGone(4242));
        assert_eq!(metrics.general_cpu_usage(), gone);
        assert_eq!(metrics.general_ram_usage(), gone);
        assert_eq!(metrics.general_ram_usage_mb(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.general_net_usage(), Err(MetricError::ProcessGone(4242)));
        assert_eq!(metrics.general_io_stats(), Err(MetricError::ProcessGone(4242)));

        let report = metrics.report();
        assert_eq!(report.errors().len(), 10);
        assert_eq!(pauses.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_counter_reset_is_reported() {
        let metrics = advancing(MockFs::counter_reset(), 0, TreeDepth::Descendants);
        assert_eq!(
            metrics.general_cpu_usage(),
            Err(MetricError::CounterRegression)
        );
    }

    #[test]
    fn test_child_exiting_mid_sample_is_dropped() {
        let metrics = advancing(MockFs::exiting_child(), 1000, TreeDepth::Descendants);
        assert_eq!(metrics.children().len(), 3);
        // 1001 is left out of both samples: (45 - 15) / 100
        assert_eq!(metrics.cpu_usage().unwrap(), 30.0);
    }

    #[test]
    fn test_repeated_calls_are_idempotent() {
        let (metrics, pauses) = counting(MockFs::typical_system(), 1000, Duration::from_secs(1));

        assert_eq!(metrics.general_ram_usage().unwrap(), 75.0);
        assert_eq!(metrics.general_ram_usage().unwrap(), 75.0);
        assert_eq!(metrics.io_stats().unwrap(), Throughput::default());
        assert_eq!(metrics.io_stats().unwrap(), Throughput::default());
        // Unchanged counters leave nothing to divide by.
        assert_eq!(
            metrics.general_cpu_usage(),
            Err(MetricError::DivisionUndefined)
        );
        assert_eq!(
            metrics.general_cpu_usage(),
            Err(MetricError::DivisionUndefined)
        );
        assert_eq!(pauses.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_zero_period_does_not_sleep() {
        let fs = MockFs::typical_system();
        let devices = SysfsDevices::new(fs.clone(), "/sys");
        let metrics = Metrics::new(
            fs,
            devices,
            MetricsConfig {
                period: Duration::ZERO,
                ..Default::default()
            },
        );
        assert_eq!(metrics.general_ram_usage_mb().unwrap(), 5859);
    }

    #[test]
    fn test_report_runs_every_getter() {
        let (metrics, pauses) = counting(MockFs::typical_system(), 1000, Duration::from_secs(1));

        let report = metrics.report();

        assert_eq!(pauses.load(Ordering::SeqCst), 10);
        assert_eq!(report.pid, 1000);
        assert_eq!(report.period, Duration::from_secs(1));
        assert_eq!(report.general_ram, Ok(75.0));
        assert_eq!(report.ram_mb, Ok(220));
        assert_eq!(report.net, Ok(Throughput::default()));
        assert_eq!(report.general_cpu, Err(MetricError::DivisionUndefined));
        assert_eq!(report.errors().len(), 2);
    }
}
