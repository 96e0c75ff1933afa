//! Pre-built mock filesystem scenarios for testing.
//!
//! Each scenario has two generations: generation 0 is the state at the start
//! of a sampling period, generation 1 the state at its end.

use super::filesystem::MockFs;

/// Namespace shared by every process except the containerised worker.
const HOST_NETNS: &str = "net:[4026531840]";
const CONTAINER_NETNS: &str = "net:[4026532000]";

struct Process {
    pid: u32,
    comm: &'static str,
    ppid: u32,
    /// (utime, stime) before and after.
    cpu: [(u64, u64); 2],
    rss_kb: Option<u64>,
    /// (rchar, wchar) before and after.
    io: Option<[(u64, u64); 2]>,
    netns: &'static str,
}

const PROCESSES: &[Process] = &[
    Process {
        pid: 1,
        comm: "systemd",
        ppid: 0,
        cpu: [(300, 200), (300, 200)],
        rss_kb: Some(12288),
        io: None,
        netns: HOST_NETNS,
    },
    Process {
        pid: 2,
        comm: "kthreadd",
        ppid: 0,
        cpu: [(0, 40), (0, 40)],
        rss_kb: None,
        io: None,
        netns: HOST_NETNS,
    },
    Process {
        pid: 1000,
        comm: "server",
        ppid: 1,
        cpu: [(10, 5), (20, 10)],
        rss_kb: Some(102400),
        io: Some([(4096, 0), (8192, 2048)]),
        netns: HOST_NETNS,
    },
    Process {
        pid: 1001,
        comm: "worker",
        ppid: 1000,
        cpu: [(5, 5), (10, 10)],
        rss_kb: Some(51200),
        io: Some([(1000, 500), (3048, 500)]),
        netns: HOST_NETNS,
    },
    Process {
        pid: 1002,
        comm: "worker (ns)",
        ppid: 1000,
        cpu: [(0, 0), (5, 0)],
        rss_kb: Some(51200),
        io: None,
        netns: CONTAINER_NETNS,
    },
    Process {
        pid: 1003,
        comm: "helper",
        ppid: 1001,
        cpu: [(0, 0), (10, 0)],
        rss_kb: Some(20480),
        io: Some([(0, 0), (1024, 1024)]),
        netns: HOST_NETNS,
    },
];

const HOST_NET_DEV: [&str; 2] = [
    "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 5000000     9876    0    0    0     0          0         0  5000000     9876    0    0    0     0       0          0
  eth0: 1024000     6543    0    0    0     0          0       100   512000     4567    0    0    0     0       0          0
 wlan0:    2048       20    0    0    0     0          0         0     1024       10    0    0    0     0       0          0
",
    "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 5100000     9976    0    0    0     0          0         0  5100000     9976    0    0    0     0       0          0
  eth0: 1126400     6643    0    0    0     0          0       100   563200     4617    0    0    0     0       0          0
 wlan0:    4096       40    0    0    0     0          0         0     2048       20    0    0    0     0       0          0
",
];

const CONTAINER_NET_DEV: [&str; 2] = [
    "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:       0        0    0    0    0     0          0         0        0        0    0    0    0     0       0          0
 ceth0:       0        0    0    0    0     0          0         0        0        0    0    0    0     0       0          0
",
    "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    8192        8    0    0    0     0          0         0     8192        8    0    0    0     0       0          0
 ceth0:   10240       10    0    0    0     0          0         0        0        0    0    0    0     0       0          0
",
];

impl MockFs {
    /// Builds a `/proc/[pid]/stat` line with the given parent and CPU times.
    pub fn stat_line(pid: u32, comm: &str, ppid: u32, utime: u64, stime: u64) -> String {
        format!(
            "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 100 10000000 250 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n"
        )
    }

    /// Creates a typical system with a small process tree.
    ///
    /// Tree: `systemd(1) -> server(1000) -> {worker(1001) -> helper(1003),
    /// worker(1002)}`, plus `kthreadd(2)`. Worker 1002 lives in its own
    /// network namespace. Between the generations:
    ///
    /// - `/proc/stat` moves from `100 0 50 850` to `150 0 70 880` (70% busy);
    ///   the tree under 1000 accounts for 40 of those 100 ticks;
    /// - `eth0` (up) moves 100 KB down and 50 KB up, `wlan0` is down and
    ///   `lo` is ignored; the container adds 10 KB down on `ceth0`, an
    ///   interface the host does not have;
    /// - `sda` (512-byte sectors) reads 20 sectors and writes 40,
    ///   `nvme0n1` (4096-byte sectors) reads one, `loop0` is ignored.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file_versions(
            "/proc/stat",
            [
                Some(
                    "\
cpu  100 0 50 850 10 0 0 0 0 0
cpu0 50 0 25 425 5 0 0 0 0 0
cpu1 50 0 25 425 5 0 0 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
                ),
                Some(
                    "\
cpu  150 0 70 880 12 0 0 0 0 0
cpu0 75 0 35 440 6 0 0 0 0 0
cpu1 75 0 35 440 6 0 0 0 0 0
intr 1000100 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500100
btime 1700000000
processes 10004
procs_running 3
procs_blocked 0
",
                ),
            ],
        );

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:        8000000 kB
MemFree:         1000000 kB
MemAvailable:    2000000 kB
Buffers:          200000 kB
Cached:           900000 kB
SwapCached:            0 kB
SwapTotal:       2000000 kB
SwapFree:        2000000 kB
",
        );

        fs.add_file_versions(
            "/proc/diskstats",
            [
                Some(
                    "\
   8       0 sda 100 0 10 50 50 0 100 40 0 60 90 0 0 0 0
   8       1 sda1 80 0 8 40 40 0 80 30 0 50 70 0 0 0 0
 259       0 nvme0n1 500 0 1000 200 300 0 0 100 0 250 300 0 0 0 0
   7       0 loop0 10 0 500 5 0 0 0 0 0 5 5 0 0 0 0
",
                ),
                Some(
                    "\
   8       0 sda 120 0 30 60 70 0 140 50 0 70 110 0 0 0 0
   8       1 sda1 98 0 28 48 58 0 120 38 0 58 86 0 0 0 0
 259       0 nvme0n1 501 0 1001 201 300 0 0 100 0 251 301 0 0 0 0
   7       0 loop0 50 0 900 25 0 0 0 0 0 25 25 0 0 0 0
",
                ),
            ],
        );

        fs.add_file_versions("/proc/net/dev", HOST_NET_DEV.map(Some));

        for p in PROCESSES {
            let stat = p
                .cpu
                .map(|(utime, stime)| Self::stat_line(p.pid, p.comm, p.ppid, utime, stime));
            let io: Vec<String> = p
                .io
                .iter()
                .flatten()
                .map(|(rchar, wchar)| io_content(*rchar, *wchar))
                .collect();
            fs.add_process(p.pid, stat, &status_content(p), io, p.netns);

            let net_dev = if p.netns == HOST_NETNS {
                HOST_NET_DEV
            } else {
                CONTAINER_NET_DEV
            };
            fs.add_file_versions(format!("/proc/{}/net/dev", p.pid), net_dev.map(Some));
        }

        fs.add_link("/proc/self/ns/net", HOST_NETNS);

        fs.add_interface("lo", 0x9);
        fs.add_interface("eth0", 0x1003);
        fs.add_interface("wlan0", 0x1002);

        fs.add_block_device("sda", Some(512));
        fs.add_block_device("nvme0n1", Some(4096));
        fs.add_block_device("loop0", Some(512));

        fs
    }

    /// A system whose CPU counters went backwards between the generations,
    /// as after a counter wraparound.
    pub fn counter_reset() -> Self {
        let mut fs = Self::typical_system();
        fs.add_file_versions(
            "/proc/stat",
            [
                Some("cpu  100 0 50 850 10 0 0 0 0 0\n"),
                Some("cpu  20 0 10 30 1 0 0 0 0 0\n"),
            ],
        );
        fs
    }

    /// A system where worker 1001 exits during the sampling period; its
    /// child 1003 is reparented to init.
    pub fn exiting_child() -> Self {
        let mut fs = Self::typical_system();
        let base = "/proc/1001";
        fs.add_file_versions(
            format!("{base}/stat"),
            [Some(Self::stat_line(1001, "worker", 1000, 5, 5)), None],
        );
        fs.add_file_versions(
            format!("{base}/io"),
            [Some(io_content(1000, 500)), None],
        );
        fs.add_file_versions(
            "/proc/1003/stat",
            [
                Some(Self::stat_line(1003, "helper", 1001, 0, 0)),
                Some(Self::stat_line(1003, "helper", 1, 10, 0)),
            ],
        );
        fs
    }
}

fn status_content(p: &Process) -> String {
    let mut status = format!(
        "Name:\t{}\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t{pid}\nPid:\t{pid}\nPPid:\t{}\n",
        p.comm,
        p.ppid,
        pid = p.pid
    );
    if let Some(rss) = p.rss_kb {
        status.push_str(&format!(
            "VmPeak:\t{:>8} kB\nVmSize:\t{:>8} kB\nVmRSS:\t{:>8} kB\n",
            rss * 4,
            rss * 3,
            rss
        ));
    }
    status.push_str("Threads:\t1\n");
    status
}

fn io_content(rchar: u64, wchar: u64) -> String {
    format!(
        "rchar: {rchar}\nwchar: {wchar}\nsyscr: 10\nsyscw: 5\nread_bytes: 0\nwrite_bytes: 0\ncancelled_write_bytes: 0\n"
    )
}
