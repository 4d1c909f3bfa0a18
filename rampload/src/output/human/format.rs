use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.2}%", ratio * 100.0)
    } else {
        "0.00%".to_string()
    }
}

/// Latency in milliseconds, shown as `us`, `ms` or `s` depending on magnitude.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        return "-".to_string();
    }
    if ms >= 1_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else if ms >= 1.0 {
        format!("{ms:.2}ms")
    } else {
        format!("{:.0}us", ms * 1_000.0)
    }
}

/// Whole-second duration such as `1m 30s`.
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = Duration::from_secs(d.as_secs_f64().round() as u64);
    humantime::format_duration(secs).to_string()
}

/// Pads `name` with dots to a fixed column, as in `http_reqs.........:`.
pub(crate) fn dotted(name: &str, width: usize) -> String {
    let mut s = name.to_string();
    if s.len() < width {
        s.extend(std::iter::repeat_n('.', width - s.len()));
    }
    s.push(':');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_latencies_by_magnitude() {
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(12.5), "12.50ms");
        assert_eq!(format_ms(1500.0), "1.50s");
        assert_eq!(format_ms(f64::NAN), "-");
    }

    #[test]
    fn formats_durations_and_ratios() {
        assert_eq!(format_duration(Duration::from_millis(90_400)), "1m 30s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_percent(0.75), "75.00%");
        assert_eq!(format_rate(12.6), "13");
        assert_eq!(dotted("vus", 6), "vus...:");
    }
}
