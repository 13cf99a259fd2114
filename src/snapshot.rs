use serde::Serialize;

/// One complete sampling pass. Built once per tick and shared read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub taken_at_unix: i64,
    pub cpu: CpuSample,
    pub memory: MemorySample,
    pub gpu: GpuSample,
    pub disks: Vec<DiskSample>,
    pub network: NetworkSample,
    pub processes: ProcessSample,
    pub host: HostSample,
    pub sources: SourceReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSample {
    pub usage_percent: f64,
    pub core_usage_percent: Vec<f64>,
    /// Thermal-zone reading when a sensor exists, otherwise a load-based
    /// estimate. Check `SourceReport::cpu_temperature` before trusting it.
    pub temperature_celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySample {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuSample {
    pub name: String,
    pub usage_percent: f64,
    pub temperature_celsius: f64,
    pub vram_total_gb: f64,
    pub vram_used_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSample {
    pub volume: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub usage_percent: f64,
    pub media_type: MediaType,
    /// Always `"Excellent"`: no SMART query is made.
    pub health: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    #[serde(rename = "NVMe SSD")]
    NvmeSsd,
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "HDD")]
    Hdd,
}

impl MediaType {
    pub fn label(self) -> &'static str {
        match self {
            MediaType::NvmeSsd => "NVMe SSD",
            MediaType::Ssd => "SSD",
            MediaType::Hdd => "HDD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSample {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    pub total: usize,
    pub responding: usize,
    pub top: Vec<TopProcess>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProcess {
    pub name: String,
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSample {
    pub machine_name: String,
    pub os_caption: String,
    pub processor_name: String,
    pub uptime_secs: u64,
    pub uptime: String,
    pub last_boot_unix: i64,
    pub last_boot: String,
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Live,
    /// Derived from other live readings by a fixed formula.
    Estimated { method: &'static str },
    /// Synthetic activity, produced only when simulation is enabled.
    Simulated { method: &'static str },
    Fallback { reason: String },
}

impl Origin {
    pub fn fallback(reason: impl ToString) -> Self {
        Origin::Fallback {
            reason: reason.to_string(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Origin::Live)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Origin::Fallback { .. })
    }
}

/// A sampler result: the value plus its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampled<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Sampled<T> {
    pub fn live(value: T) -> Self {
        Self {
            value,
            origin: Origin::Live,
        }
    }

    pub fn fallback(value: T, reason: impl ToString) -> Self {
        Self {
            value,
            origin: Origin::fallback(reason),
        }
    }

    pub fn with_origin(value: T, origin: Origin) -> Self {
        Self { value, origin }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub cpu_usage: Origin,
    pub cpu_cores: Origin,
    pub cpu_temperature: Origin,
    pub memory: Origin,
    pub gpu_adapter: Origin,
    pub gpu_activity: Origin,
    pub storage: Origin,
    pub network: Origin,
    pub processes: Origin,
    pub host: Origin,
}

impl SourceReport {
    pub fn entries(&self) -> [(&'static str, &Origin); 10] {
        [
            ("cpu_usage", &self.cpu_usage),
            ("cpu_cores", &self.cpu_cores),
            ("cpu_temperature", &self.cpu_temperature),
            ("memory", &self.memory),
            ("gpu_adapter", &self.gpu_adapter),
            ("gpu_activity", &self.gpu_activity),
            ("storage", &self.storage),
            ("network", &self.network),
            ("processes", &self.processes),
            ("host", &self.host),
        ]
    }
}

pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn clamp_percent(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    v.clamp(0.0, 100.0)
}

pub fn non_negative(v: f64) -> f64 {
    if !v.is_finite() || v < 0.0 {
        0.0
    } else {
        v
    }
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round1(bytes as f64 / BYTES_PER_GB)
}

pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    clamp_percent(round1(part / whole * 100.0))
}
