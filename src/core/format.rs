//! Human-readable formatting for distances, durations, speeds and sizes.

/// `850 m`, `2.35 km`, `42 km`
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round())
    } else if meters < 10_000.0 {
        format!("{:.2} km", meters / 1000.0)
    } else {
        format!("{} km", (meters / 1000.0).round())
    }
}

/// `1h 5m`, `3m 20s`, `45s`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Speed in km/h with one decimal.
pub fn format_speed(meters_per_second: f64) -> String {
    format!("{:.1} km/h", meters_per_second * 3.6)
}

/// `512 B`, `34.00 KB`, `1.50 MB`, `2.00 GB`
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}
