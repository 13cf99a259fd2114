use crate::collectors::{MediaHint, RawVolume, SourceError, SourceResult};
use crate::snapshot::{bytes_to_gb, non_negative, percent_of, round1, DiskSample, MediaType, Sampled};

pub const HEALTH_PLACEHOLDER: &str = "Excellent";

pub fn synthetic_volume() -> DiskSample {
    DiskSample {
        volume: "C:".to_string(),
        total_gb: 2000.0,
        used_gb: 856.0,
        free_gb: 1144.0,
        usage_percent: 42.8,
        media_type: MediaType::NvmeSsd,
        health: HEALTH_PLACEHOLDER,
    }
}

/// Unknown media gets the generic `SSD` label.
pub fn classify_media(hint: MediaHint, device: &str) -> MediaType {
    let nvme = device.to_lowercase().contains("nvme");
    match hint {
        MediaHint::Hdd => MediaType::Hdd,
        MediaHint::Ssd if nvme => MediaType::NvmeSsd,
        MediaHint::Unknown if nvme => MediaType::NvmeSsd,
        MediaHint::Ssd | MediaHint::Unknown => MediaType::Ssd,
    }
}

pub fn to_disk_sample(v: RawVolume) -> DiskSample {
    let free = v.free_bytes.min(v.total_bytes);
    let total_gb = bytes_to_gb(v.total_bytes);
    let free_gb = bytes_to_gb(free);
    let used_gb = non_negative(round1(total_gb - free_gb));
    DiskSample {
        media_type: classify_media(v.media, &v.device),
        volume: v.volume,
        total_gb,
        used_gb,
        free_gb,
        usage_percent: percent_of(used_gb, total_gb),
        health: HEALTH_PLACEHOLDER,
    }
}

pub fn sample(volumes: SourceResult<Vec<RawVolume>>) -> Sampled<Vec<DiskSample>> {
    match volumes {
        Ok(list) if list.is_empty() => Sampled::fallback(
            vec![synthetic_volume()],
            SourceError::Unavailable("фиксированные тома не найдены".to_string()),
        ),
        Ok(list) => Sampled::live(list.into_iter().map(to_disk_sample).collect()),
        Err(err) => Sampled::fallback(vec![synthetic_volume()], err),
    }
}
