use crate::collectors::{RawAdapter, SourceError, SourceResult};
use crate::snapshot::{clamp_percent, non_negative, round1, GpuSample, Origin, BYTES_PER_GB};

pub const PLACEHOLDER_NAME: &str = "NVIDIA RTX 4080 Super";
pub const PLACEHOLDER_VRAM_TOTAL_GB: f64 = 16.0;
pub const PLACEHOLDER_VRAM_USED_GB: f64 = 8.2;
pub const USAGE_SIMULATION: &str = "1.2 * cpu_usage + jitter(-10..10)";
pub const TEMPERATURE_ESTIMATE: &str = "40 + 0.45 * gpu_usage";
pub const VRAM_USED_ESTIMATE: &str = "0.51 * vram_total";

const SOFTWARE_RENDERER_MARKERS: [&str; 6] = [
    "microsoft",
    "basic display",
    "basic render",
    "llvmpipe",
    "softpipe",
    "swiftshader",
];

/// How to fill GPU load when no adapter reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity {
    /// Synthesize load from CPU usage plus the given jitter in [-10, 10].
    Simulate { jitter: f64 },
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuReading {
    pub sample: GpuSample,
    pub adapter: Origin,
    pub activity: Origin,
}

pub fn is_software_renderer(name: &str) -> bool {
    let lower = name.to_lowercase();
    SOFTWARE_RENDERER_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn select_adapter(adapters: Vec<RawAdapter>) -> Option<RawAdapter> {
    adapters
        .into_iter()
        .find(|a| !a.name.trim().is_empty() && !is_software_renderer(&a.name))
}

pub fn sample(
    adapters: SourceResult<Vec<RawAdapter>>,
    cpu_usage: f64,
    activity: Activity,
) -> GpuReading {
    let (adapter, mut adapter_origin) = match adapters {
        Ok(list) => match select_adapter(list) {
            Some(a) => (Some(a), Origin::Live),
            None => (
                None,
                Origin::fallback(SourceError::Unavailable(
                    "дискретный видеоадаптер не найден".to_string(),
                )),
            ),
        },
        Err(err) => (None, Origin::fallback(err)),
    };

    let (usage, usage_origin) = match adapter.as_ref().and_then(|a| a.utilization_percent) {
        Some(v) => (clamp_percent(round1(v)), Origin::Live),
        None => match activity {
            Activity::Simulate { jitter } => (
                simulate_usage(cpu_usage, jitter),
                Origin::Simulated {
                    method: USAGE_SIMULATION,
                },
            ),
            Activity::Disabled => (
                0.0,
                Origin::fallback("нет датчика загрузки GPU, симуляция отключена"),
            ),
        },
    };

    let temperature = adapter
        .as_ref()
        .and_then(|a| a.temperature_celsius)
        .filter(|t| t.is_finite() && *t > 0.0)
        .map(round1);
    let activity_origin = match (&usage_origin, temperature) {
        (Origin::Live, Some(_)) => Origin::Live,
        (Origin::Live, None) => Origin::Estimated {
            method: TEMPERATURE_ESTIMATE,
        },
        (other, _) => other.clone(),
    };
    let temperature_celsius = temperature.unwrap_or_else(|| estimate_temperature(usage));

    let sample = match adapter {
        Some(a) => {
            let reported = round1(a.memory_total_bytes as f64 / BYTES_PER_GB);
            let vram_total_gb = if reported > 0.0 {
                reported
            } else {
                adapter_origin = Origin::fallback("адаптер не сообщает объём видеопамяти");
                PLACEHOLDER_VRAM_TOTAL_GB
            };
            let vram_used_gb = match a.memory_used_bytes {
                Some(used) => round1(used as f64 / BYTES_PER_GB).min(vram_total_gb),
                None => {
                    if adapter_origin.is_live() {
                        adapter_origin = Origin::Estimated {
                            method: VRAM_USED_ESTIMATE,
                        };
                    }
                    round1(vram_total_gb * 0.51)
                }
            };
            GpuSample {
                name: a.name.trim().to_string(),
                usage_percent: usage,
                temperature_celsius,
                vram_total_gb,
                vram_used_gb: non_negative(vram_used_gb),
            }
        }
        None => GpuSample {
            name: PLACEHOLDER_NAME.to_string(),
            usage_percent: usage,
            temperature_celsius,
            vram_total_gb: PLACEHOLDER_VRAM_TOTAL_GB,
            vram_used_gb: PLACEHOLDER_VRAM_USED_GB,
        },
    };

    GpuReading {
        sample,
        adapter: adapter_origin,
        activity: activity_origin,
    }
}

pub fn simulate_usage(cpu_usage: f64, jitter: f64) -> f64 {
    clamp_percent(round1(cpu_usage * 1.2 + jitter.clamp(-10.0, 10.0)))
}

pub fn estimate_temperature(gpu_usage: f64) -> f64 {
    round1(40.0 + gpu_usage * 0.45)
}
