//! Rendering of metric results for the terminal and for JSON lines.

use serde_json::{Value, json};

use crate::collector::MetricError;
use crate::models::{Report, Throughput};

/// Shown in place of a metric that could not be measured.
pub const UNAVAILABLE: &str = "n/a";

// ---------------------------------------------------------------------------
// Value formatting
// ---------------------------------------------------------------------------

/// Format a percentage with one decimal.
pub fn format_percent(pct: f64) -> String {
    format!("{:.1}%", pct)
}

/// Format MiB to human-readable size.
pub fn format_mb(mb: u64) -> String {
    if mb >= 1024 {
        format!("{:.1} GiB", mb as f64 / 1024.0)
    } else {
        format!("{} MiB", mb)
    }
}

/// Format KiB per second rate to human-readable.
pub fn format_kb_rate(rate: f64) -> String {
    if rate < 0.05 {
        "0 KiB/s".to_string()
    } else if rate >= 1024.0 * 1024.0 {
        format!("{:.1} GiB/s", rate / (1024.0 * 1024.0))
    } else if rate >= 1024.0 {
        format!("{:.1} MiB/s", rate / 1024.0)
    } else {
        format!("{:.1} KiB/s", rate)
    }
}

/// Format a direction pair such as network down/up or disk read/write.
pub fn format_throughput(t: &Throughput, period: std::time::Duration) -> (String, String) {
    let (read, write) = t.per_second(period);
    (format_kb_rate(read), format_kb_rate(write))
}

fn or_unavailable<T>(value: &Result<T, MetricError>, f: impl Fn(&T) -> String) -> String {
    value.as_ref().map(f).unwrap_or_else(|_| UNAVAILABLE.to_string())
}

fn pair_or_unavailable(
    value: &Result<Throughput, MetricError>,
    period: std::time::Duration,
) -> (String, String) {
    match value {
        Ok(t) => format_throughput(t, period),
        Err(_) => (UNAVAILABLE.to_string(), UNAVAILABLE.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

/// Renders a report as an aligned text block.
///
/// The process column is omitted when the report has no target pid.
pub fn render_report(report: &Report) -> String {
    let mut out = format!(
        "{}  period {:.1}s",
        report.timestamp.format("%Y-%m-%d %H:%M:%S"),
        report.period.as_secs_f64()
    );
    if report.pid != 0 {
        out.push_str(&format!("  pid {}", report.pid));
    }
    out.push('\n');

    let (net_down, net_up) = pair_or_unavailable(&report.general_net, report.period);
    let (io_read, io_write) = pair_or_unavailable(&report.general_io, report.period);
    let mut rows = vec![
        (
            "CPU",
            or_unavailable(&report.general_cpu, |v| format_percent(*v)),
            or_unavailable(&report.cpu, |v| format_percent(*v)),
        ),
        (
            "RAM",
            or_unavailable(&report.general_ram, |v| format_percent(*v)),
            or_unavailable(&report.ram, |v| format_percent(*v)),
        ),
        (
            "RAM size",
            or_unavailable(&report.general_ram_mb, |v| format_mb(*v)),
            or_unavailable(&report.ram_mb, |v| format_mb(*v)),
        ),
    ];

    let (p_down, p_up) = pair_or_unavailable(&report.net, report.period);
    let (p_read, p_write) = pair_or_unavailable(&report.io, report.period);
    rows.push(("Net down", net_down, p_down));
    rows.push(("Net up", net_up, p_up));
    rows.push(("Disk read", io_read, p_read));
    rows.push(("Disk write", io_write, p_write));

    for (label, system, process) in rows {
        if report.pid == 0 {
            out.push_str(&format!("  {:<11}{:>14}\n", label, system));
        } else {
            out.push_str(&format!("  {:<11}{:>14}{:>14}\n", label, system, process));
        }
    }
    out
}

fn json_value<T: serde::Serialize>(value: &Result<T, MetricError>) -> Value {
    match value {
        Ok(v) => json!(v),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

/// Renders a report as one JSON object; failed metrics carry an `error` field.
pub fn report_json(report: &Report) -> Value {
    json!({
        "timestamp": report.timestamp.to_rfc3339(),
        "pid": report.pid,
        "period_secs": report.period.as_secs_f64(),
        "system": {
            "cpu_percent": json_value(&report.general_cpu),
            "ram_percent": json_value(&report.general_ram),
            "ram_mb": json_value(&report.general_ram_mb),
            "net_kb": json_value(&report.general_net),
            "io_kb": json_value(&report.general_io),
        },
        "process": {
            "cpu_percent": json_value(&report.cpu),
            "ram_percent": json_value(&report.ram),
            "ram_mb": json_value(&report.ram_mb),
            "net_kb": json_value(&report.net),
            "io_kb": json_value(&report.io),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn report(pid: u32) -> Report {
        Report {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            pid,
            period: Duration::from_secs(2),
            general_cpu: Ok(70.0),
            cpu: Ok(40.0),
            general_ram: Ok(75.0),
            ram: Err(MetricError::ProcessGone(pid)),
            general_ram_mb: Ok(5859),
            ram_mb: Ok(220),
            general_net: Ok(Throughput {
                read_kb: 100,
                write_kb: 50,
            }),
            net: Ok(Throughput::default()),
            general_io: Err(MetricError::CounterRegression),
            io: Ok(Throughput {
                read_kb: 4096,
                write_kb: 0,
            }),
        }
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(70.0), "70.0%");
        assert_eq!(format_percent(2.816), "2.8%");
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(220), "220 MiB");
        assert_eq!(format_mb(5859), "5.7 GiB");
    }

    #[test]
    fn test_format_kb_rate() {
        assert_eq!(format_kb_rate(0.0), "0 KiB/s");
        assert_eq!(format_kb_rate(50.0), "50.0 KiB/s");
        assert_eq!(format_kb_rate(2048.0), "2.0 MiB/s");
        assert_eq!(format_kb_rate(3.0 * 1024.0 * 1024.0), "3.0 GiB/s");
    }

    #[test]
    fn test_format_throughput_normalises_period() {
        let t = Throughput {
            read_kb: 100,
            write_kb: 50,
        };
        assert_eq!(
            format_throughput(&t, Duration::from_secs(2)),
            ("50.0 KiB/s".to_string(), "25.0 KiB/s".to_string())
        );
    }

    #[test]
    fn test_render_report_process() {
        let text = render_report(&report(1000));
        assert!(text.starts_with("2024-03-01 12:00:00  period 2.0s  pid 1000\n"));
        assert!(text.contains("CPU"));
        assert!(text.contains("70.0%"));
        assert!(text.contains("40.0%"));
        // RAM of the process and the disk totals are unavailable
        assert_eq!(text.matches(UNAVAILABLE).count(), 3);
        assert!(text.contains("2.0 MiB/s"));
        assert_eq!(text.lines().count(), 8);
    }

    #[test]
    fn test_render_report_system_only() {
        let text = render_report(&report(0));
        assert!(!text.contains("pid"));
        assert!(!text.contains("40.0%"));
        assert_eq!(text.matches(UNAVAILABLE).count(), 2);
    }

    #[test]
    fn test_report_json() {
        let value = report_json(&report(1000));
        assert_eq!(value["pid"], 1000);
        assert_eq!(value["system"]["cpu_percent"], 70.0);
        assert_eq!(value["system"]["net_kb"]["read_kb"], 100);
        assert_eq!(
            value["system"]["io_kb"]["error"],
            "counter decreased between samples"
        );
        assert_eq!(value["process"]["ram"]["error"], Value::Null);
        assert_eq!(value["process"]["ram_percent"]["error"], "process 1000 not found");
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00+00:00");
    }
}
