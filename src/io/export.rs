//! CSV export of a completed run's swap/miss event log (`--telemetry-out`).

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::MetricsCollector;

const HEADER: &str = "time,kind,scooter_id,station_id,old_level,new_level,miss_type,wait_started";

/// Exports every recorded swap and miss event, time-ordered, to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be created or written.
pub fn export_events_csv(metrics: &MetricsCollector, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_events_csv(metrics, io::BufWriter::new(file))
}

/// Writes the swap/miss event log as CSV to any writer, merged into
/// ascending time order.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_events_csv(metrics: &MetricsCollector, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(','))?;

    #[derive(Clone, Copy)]
    enum Row<'a> {
        Swap(&'a crate::sim::metrics::SwapEvent),
        Miss(&'a crate::sim::metrics::MissEvent),
    }

    let mut rows: Vec<Row> = Vec::with_capacity(metrics.swap_events.len() + metrics.miss_events.len());
    rows.extend(metrics.swap_events.iter().map(Row::Swap));
    rows.extend(metrics.miss_events.iter().map(Row::Miss));
    rows.sort_by(|a, b| {
        let ta = match a {
            Row::Swap(s) => s.time,
            Row::Miss(m) => m.time,
        };
        let tb = match b {
            Row::Swap(s) => s.time,
            Row::Miss(m) => m.time,
        };
        ta.total_cmp(&tb)
    });

    for row in rows {
        match row {
            Row::Swap(s) => {
                wtr.write_record([
                    format!("{:.2}", s.time),
                    "swap".to_string(),
                    s.scooter_id.to_string(),
                    s.station_id.to_string(),
                    format!("{:.4}", s.old_level),
                    format!("{:.4}", s.new_level),
                    String::new(),
                    String::new(),
                ])?;
            }
            Row::Miss(m) => {
                let miss_type = match m.miss_type {
                    crate::sim::metrics::MissType::NoBattery => "no_battery",
                    crate::sim::metrics::MissType::PartialCharge => "partial_charge",
                };
                wtr.write_record([
                    format!("{:.2}", m.time),
                    "miss".to_string(),
                    m.scooter_id.to_string(),
                    m.station_id.to_string(),
                    String::new(),
                    m.charge_level.map(|l| format!("{l:.4}")).unwrap_or_default(),
                    miss_type.to_string(),
                    String::new(),
                ])?;
            }
        }
    }

    wtr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_schema() {
        let metrics = MetricsCollector::new();
        let mut buf = Vec::new();
        write_events_csv(&metrics, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(output.lines().next(), Some(HEADER));
    }

    #[test]
    fn swaps_and_misses_interleave_in_time_order() {
        let mut metrics = MetricsCollector::new();
        metrics.record_miss(5.0, 1, 10, crate::sim::metrics::MissType::NoBattery, None);
        metrics.record_swap(2.0, 2, 10, 0.1, 1.0);
        metrics.record_swap(9.0, 1, 10, 0.0, 1.0);

        let mut buf = Vec::new();
        write_events_csv(&metrics, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().skip(1).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("2.00,swap"));
        assert!(lines[1].starts_with("5.00,miss"));
        assert!(lines[2].starts_with("9.00,swap"));
    }
}
