//! Human-readable console output

use crate::device::DeviceProfile;
use crate::stats::AggregatedRecord;

/// Index of p50 and p99 in the percentile set
const P50: usize = 6;
const P99: usize = 11;

/// Print the device facts a plan was derived from
pub fn print_profile(profile: &DeviceProfile) {
    println!("Device: {}", profile.device.display());
    if profile.is_zoned {
        println!(
            "  Zoned: {} zones x {} (capacity {}), max open zones: {}",
            profile.zone_count,
            format_bytes(profile.zone_size_bytes),
            format_bytes(profile.zone_capacity_bytes),
            if profile.max_open_zones == 0 {
                "unlimited".to_string()
            } else {
                profile.max_open_zones.to_string()
            }
        );
    } else {
        println!("  Conventional, {}", format_bytes(profile.total_size_bytes));
    }
    println!("  Sector size: {} B", profile.sector_size_bytes);
}

/// Print one benchmark's records as a table
pub fn print_records(benchmark: &str, records: &[AggregatedRecord]) {
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!("  {}", benchmark);
    println!("═══════════════════════════════════════════════════════════════════════════");

    if records.is_empty() {
        println!("  No results");
        println!();
        return;
    }

    println!(
        "  {:<10} {:>5} {:>5} {:>8} {:>12} {:>14} {:>10} {:>10} {:>10}",
        "op", "jobs", "qd", "bs", "write rate", "throughput", "mean lat", "p50 lat", "p99 lat"
    );
    for record in records {
        let rate = record
            .key
            .write_rate_limit
            .map(|r| format!("{}/s", format_bytes(r)))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<10} {:>5} {:>5} {:>8} {:>12} {:>14} {:>8}us {:>8}us {:>8}us",
            record.key.operation.fio_name(),
            record.key.parallelism,
            record.key.queue_depth,
            format_bytes(record.key.block_size),
            rate,
            format!("{}/s", format_bytes(record.throughput_bytes_per_sec)),
            record.mean_latency_us,
            median_latency_us(record),
            record.percentiles_us[P99],
        );
    }
    println!();
}

/// p50 latency of a record, for one-line summaries
pub fn median_latency_us(record: &AggregatedRecord) -> u64 {
    record.percentiles_us[P50]
}

/// Format bytes with binary units
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TiB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{} KiB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}
