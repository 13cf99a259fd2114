use crate::collectors::{NetCounters, SourceResult};
use crate::snapshot::{round1, ConnectionStatus, NetworkSample, Sampled};

pub const FALLBACK_DOWNLOAD_MBPS: f64 = 125.0;
pub const FALLBACK_UPLOAD_MBPS: f64 = 45.0;

/// Active, non-loopback interfaces are the only ones tracked.
pub fn is_tracked_interface(name: &str, operstate: Option<&str>) -> bool {
    let lower = name.to_lowercase();
    if lower == "lo" || lower.starts_with("lo:") || lower.contains("loopback") {
        return false;
    }
    match operstate.map(str::trim) {
        None => true,
        Some(state) => matches!(state, "up" | "unknown"),
    }
}

/// `8 * delta_bytes / (elapsed * 1e6)`; a counter that went backwards
/// counts as zero traffic.
pub fn mbps(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    let delta = current.saturating_sub(previous) as f64;
    round1(delta * 8.0 / (elapsed_secs * 1_000_000.0)).max(0.0)
}

/// Computes throughput against `baseline`. After every successful read the
/// caller stores the counters and the read time as the new baseline.
pub fn sample(
    baseline: Option<NetCounters>,
    current: SourceResult<NetCounters>,
    elapsed_secs: f64,
    tracked_interfaces: usize,
) -> Sampled<NetworkSample> {
    let status = if tracked_interfaces > 0 {
        ConnectionStatus::Connected
    } else {
        ConnectionStatus::Disconnected
    };

    let current = match current {
        Ok(c) => c,
        Err(err) => {
            let totals = baseline.unwrap_or_default();
            return Sampled::fallback(fallback_sample(totals, status), err);
        }
    };

    let Some(previous) = baseline else {
        return Sampled::fallback(
            fallback_sample(current, status),
            "нет базовой точки счётчиков",
        );
    };
    if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
        return Sampled::fallback(
            fallback_sample(current, status),
            format!("неположительный интервал {elapsed_secs} с"),
        );
    }

    Sampled::live(NetworkSample {
        download_mbps: mbps(previous.received_bytes, current.received_bytes, elapsed_secs),
        upload_mbps: mbps(previous.sent_bytes, current.sent_bytes, elapsed_secs),
        bytes_received: current.received_bytes,
        bytes_sent: current.sent_bytes,
        status,
    })
}

fn fallback_sample(totals: NetCounters, status: ConnectionStatus) -> NetworkSample {
    NetworkSample {
        download_mbps: FALLBACK_DOWNLOAD_MBPS,
        upload_mbps: FALLBACK_UPLOAD_MBPS,
        bytes_received: totals.received_bytes,
        bytes_sent: totals.sent_bytes,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::SourceError;

    fn counters(rx: u64, tx: u64) -> NetCounters {
        NetCounters {
            received_bytes: rx,
            sent_bytes: tx,
        }
    }

    #[test]
    fn no_traffic_over_two_seconds_is_exactly_zero() {
        let s = sample(Some(counters(1000, 500)), Ok(counters(1000, 500)), 2.0, 1);
        assert_eq!(s.value.download_mbps, 0.0);
        assert_eq!(s.value.upload_mbps, 0.0);
        assert!(s.origin.is_live());
    }

    #[test]
    fn rates_are_megabits_per_second() {
        let s = sample(
            Some(counters(0, 0)),
            Ok(counters(2_500_000, 250_000)),
            2.0,
            2,
        );
        assert_eq!(s.value.download_mbps, 10.0);
        assert_eq!(s.value.upload_mbps, 1.0);
        assert_eq!(s.value.bytes_received, 2_500_000);
        assert_eq!(s.value.status, ConnectionStatus::Connected);
    }

    #[test]
    fn counter_reset_never_goes_negative() {
        let s = sample(Some(counters(9_000_000, 9_000_000)), Ok(counters(10, 10)), 1.0, 1);
        assert_eq!(s.value.download_mbps, 0.0);
        assert_eq!(s.value.upload_mbps, 0.0);
    }

    #[test]
    fn non_positive_elapsed_uses_fixed_fallback() {
        for elapsed in [0.0, -1.5] {
            let s = sample(Some(counters(0, 0)), Ok(counters(100, 100)), elapsed, 1);
            assert_eq!(s.value.download_mbps, FALLBACK_DOWNLOAD_MBPS);
            assert_eq!(s.value.upload_mbps, FALLBACK_UPLOAD_MBPS);
            assert_eq!(s.value.bytes_received, 100);
            assert!(s.origin.is_fallback());
        }
    }

    #[test]
    fn read_failure_keeps_previous_totals() {
        let s = sample(
            Some(counters(42, 7)),
            Err(SourceError::Unavailable("iface".to_string())),
            1.0,
            0,
        );
        assert_eq!(s.value.bytes_received, 42);
        assert_eq!(s.value.status, ConnectionStatus::Disconnected);
        assert!(s.origin.is_fallback());
    }

    #[test]
    fn loopback_and_down_interfaces_are_skipped() {
        assert!(!is_tracked_interface("lo", Some("unknown")));
        assert!(!is_tracked_interface("Loopback Pseudo-Interface 1", None));
        assert!(!is_tracked_interface("eth0", Some("down")));
        assert!(is_tracked_interface("eth0", Some("up\n")));
        assert!(is_tracked_interface("wlan0", None));
    }
}
