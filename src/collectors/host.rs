use crate::collectors::{RawHost, SourceResult};
use crate::snapshot::{HostSample, Sampled};
use std::time::{Duration, UNIX_EPOCH};

pub const FALLBACK_MACHINE_NAME: &str = "DESKTOP-PC";
pub const FALLBACK_OS_CAPTION: &str = "Windows 11 Pro";
pub const FALLBACK_PROCESSOR_NAME: &str = "Intel Core i7-12700K";
/// 2 days, 14:32:18
pub const FALLBACK_UPTIME_SECS: u64 = 2 * 86_400 + 14 * 3_600 + 32 * 60 + 18;

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    format!("{days} days, {hours:02}:{minutes:02}:{seconds:02}")
}

fn format_unix(ts: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_secs(ts.max(0) as u64);
    humantime::format_rfc3339_seconds(st).to_string()
}

fn build(
    machine_name: String,
    os_caption: String,
    processor_name: String,
    uptime_secs: u64,
    now_unix: i64,
) -> HostSample {
    let last_boot_unix = now_unix.saturating_sub(uptime_secs as i64);
    HostSample {
        machine_name,
        os_caption,
        processor_name,
        uptime_secs,
        uptime: format_uptime(uptime_secs),
        last_boot_unix,
        last_boot: format_unix(last_boot_unix),
    }
}

/// `processor_name` comes from the collector's one-time cache; `None` means
/// the lookup has not succeeded yet.
pub fn sample(
    host: SourceResult<RawHost>,
    processor_name: Option<&str>,
    now_unix: i64,
) -> Sampled<HostSample> {
    let processor = processor_name
        .unwrap_or(FALLBACK_PROCESSOR_NAME)
        .to_string();
    match host {
        Ok(h) => Sampled::live(build(
            h.machine_name,
            h.os_caption,
            processor,
            h.uptime_secs,
            now_unix,
        )),
        Err(err) => Sampled::fallback(
            build(
                FALLBACK_MACHINE_NAME.to_string(),
                FALLBACK_OS_CAPTION.to_string(),
                FALLBACK_PROCESSOR_NAME.to_string(),
                FALLBACK_UPTIME_SECS,
                now_unix,
            ),
            err,
        ),
    }
}
