use crate::audit::format_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";
const MEMINFO: &str = "/proc/meminfo";

/// Health report posted to `/health/doorbot`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub last_unlock: Option<String>,
    pub cpu_temp_c: Option<f64>,
    pub memory_used_pct: Option<f64>,
}

impl Heartbeat {
    /// Sample system stats now. Stats that cannot be read are left empty.
    pub async fn collect(uptime: Duration, last_unlock: Option<DateTime<Utc>>) -> Self {
        let cpu_temp_c = read_optional(THERMAL_ZONE)
            .await
            .as_deref()
            .and_then(parse_cpu_temp);
        let memory_used_pct = read_optional(MEMINFO)
            .await
            .as_deref()
            .and_then(parse_memory_used_pct);

        Self {
            timestamp: format_timestamp(Utc::now()),
            uptime_seconds: uptime.as_secs(),
            last_unlock: last_unlock.map(format_timestamp),
            cpu_temp_c,
            memory_used_pct,
        }
    }
}

async fn read_optional(path: impl AsRef<Path>) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

/// Millidegrees from the thermal zone, rounded to 0.1 °C
pub fn parse_cpu_temp(raw: &str) -> Option<f64> {
    let millidegrees: i64 = raw.trim().parse().ok()?;
    Some(round1(millidegrees as f64 / 1000.0))
}

/// Percentage of memory in use from `/proc/meminfo`, rounded to 0.1
pub fn parse_memory_used_pct(meminfo: &str) -> Option<f64> {
    let mut total = None;
    let mut available = None;

    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("MemTotal:"), Some(value)) => total = value.parse::<f64>().ok(),
            (Some("MemAvailable:"), Some(value)) => available = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    let (total, available) = (total?, available?);
    if total <= 0.0 {
        return None;
    }
    Some(round1(100.0 * (1.0 - available / total)))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_temp() {
        assert_eq!(parse_cpu_temp("48312\n"), Some(48.3));
        assert_eq!(parse_cpu_temp("garbage"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:        1000000 kB\n\
                       MemFree:          100000 kB\n\
                       MemAvailable:     250000 kB\n";
        assert_eq!(parse_memory_used_pct(meminfo), Some(75.0));
        assert_eq!(parse_memory_used_pct("MemTotal: 1000 kB\n"), None);
    }

    #[test]
    fn test_heartbeat_serializes_missing_stats_as_null() {
        let heartbeat = Heartbeat {
            timestamp: "2024-01-01 00:00:00".to_string(),
            uptime_seconds: 42,
            last_unlock: None,
            cpu_temp_c: None,
            memory_used_pct: Some(12.5),
        };
        let json = serde_json::to_value(&heartbeat).unwrap();
        assert_eq!(json["uptime_seconds"], 42);
        assert!(json["last_unlock"].is_null());
        assert!(json["cpu_temp_c"].is_null());
        assert_eq!(json["memory_used_pct"], 12.5);
    }

    #[tokio::test]
    async fn test_collect_never_fails() {
        let heartbeat = Heartbeat::collect(Duration::from_secs(90), None).await;
        assert_eq!(heartbeat.uptime_seconds, 90);
        assert!(heartbeat.last_unlock.is_none());
    }
}
