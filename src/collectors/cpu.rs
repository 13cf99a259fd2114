use crate::collectors::{SourceResult, ThermalReading};
use crate::snapshot::{clamp_percent, round1, Origin, Sampled};

pub const TEMPERATURE_ESTIMATE: &str = "35 + 0.4 * cpu_usage";

pub fn sample_usage(reading: SourceResult<f64>) -> Sampled<f64> {
    match reading {
        Ok(v) => Sampled::live(clamp_percent(round1(v))),
        Err(err) => Sampled::fallback(0.0, err),
    }
}

/// The result always has exactly `cores` entries.
pub fn sample_cores(reading: SourceResult<Vec<f64>>, cores: usize) -> Sampled<Vec<f64>> {
    match reading {
        Ok(values) if values.len() == cores => Sampled::live(
            values
                .into_iter()
                .map(|v| clamp_percent(round1(v)))
                .collect(),
        ),
        Ok(values) => {
            let reason = format!(
                "ожидалось {cores} счётчиков ядер, получено {}",
                values.len()
            );
            let mut fixed: Vec<f64> = values
                .into_iter()
                .take(cores)
                .map(|v| clamp_percent(round1(v)))
                .collect();
            fixed.resize(cores, 0.0);
            Sampled::fallback(fixed, reason)
        }
        Err(err) => Sampled::fallback(vec![0.0; cores], err),
    }
}

/// Without a thermal sensor the value is a load-based placeholder, not a
/// measurement; the origin says so.
pub fn sample_temperature(
    reading: SourceResult<Option<ThermalReading>>,
    cpu_usage: f64,
) -> Sampled<f64> {
    let celsius = match reading {
        Ok(Some(raw)) => to_celsius(raw),
        Ok(None) | Err(_) => None,
    };
    match celsius {
        Some(v) => Sampled::live(round1(v)),
        None => Sampled::with_origin(
            estimate_temperature(cpu_usage),
            Origin::Estimated {
                method: TEMPERATURE_ESTIMATE,
            },
        ),
    }
}

pub fn to_celsius(reading: ThermalReading) -> Option<f64> {
    let v = match reading {
        ThermalReading::DeciKelvin(raw) => (raw - 2732.0) / 10.0,
        ThermalReading::Celsius(v) => v,
    };
    if !v.is_finite() || !(0.0..=130.0).contains(&v) {
        return None;
    }
    Some(v)
}

pub fn estimate_temperature(cpu_usage: f64) -> f64 {
    round1(35.0 + cpu_usage * 0.4)
}
