use crate::collectors::{SourceError, SourceResult};
use crate::snapshot::{non_negative, percent_of, round1, MemorySample, Sampled, BYTES_PER_GB};

pub fn fallback_sample() -> MemorySample {
    MemorySample {
        total_gb: 32.0,
        used_gb: 12.4,
        available_gb: 19.6,
        usage_percent: 38.8,
    }
}

pub fn sample(total: SourceResult<u64>, available: SourceResult<u64>) -> Sampled<MemorySample> {
    let total = match total {
        Ok(0) => {
            return Sampled::fallback(
                fallback_sample(),
                SourceError::Unavailable("объём физической памяти равен нулю".to_string()),
            )
        }
        Ok(v) => v,
        Err(err) => return Sampled::fallback(fallback_sample(), err),
    };
    let available = match available {
        Ok(v) => v.min(total),
        Err(err) => return Sampled::fallback(fallback_sample(), err),
    };

    let total_gb = round1(total as f64 / BYTES_PER_GB);
    let available_gb = round1(available as f64 / BYTES_PER_GB);
    let used_gb = non_negative(round1(total_gb - available_gb));

    Sampled::live(MemorySample {
        total_gb,
        used_gb,
        available_gb,
        usage_percent: percent_of(used_gb, total_gb),
    })
}
