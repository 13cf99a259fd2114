pub mod command;
pub mod cpu;
pub mod gpu;
pub mod host;
pub mod memory;
pub mod network;
pub mod process;
pub mod storage;
pub mod system;

#[cfg(test)]
pub mod fake;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("источник недоступен: {0}")]
    Unavailable(String),
    #[error("запрос {query} превысил таймаут {timeout:?}")]
    Timeout { query: String, timeout: Duration },
    #[error("не удалось выполнить {query}: {source}")]
    Io {
        query: String,
        source: std::io::Error,
    },
    #[error("неожиданный ответ {query}: {detail}")]
    Malformed { query: String, detail: String },
    #[error("ресурсы источника уже освобождены")]
    Released,
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Thermal sensors report in different units depending on the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThermalReading {
    /// ACPI thermal zone, tenths of a Kelvin.
    DeciKelvin(f64),
    Celsius(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawAdapter {
    pub name: String,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: Option<u64>,
    pub utilization_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHint {
    Ssd,
    Hdd,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawVolume {
    pub volume: String,
    pub device: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub media: MediaHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetCounters {
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawProcess {
    pub pid: u32,
    pub name: String,
    /// Share of one logical core, as sysinfo reports it (may exceed 100).
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub responding: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawHost {
    pub machine_name: String,
    pub os_caption: String,
    pub uptime_secs: u64,
}

/// OS-facing half of the collector. Every read is independent: an error in
/// one must not affect the others.
pub trait SystemSource: Send + 'static {
    /// Refreshes cached counters once per tick, before any read.
    fn refresh(&mut self);

    fn logical_processors(&self) -> usize;

    fn cpu_usage(&mut self) -> SourceResult<f64>;

    fn core_usages(&mut self) -> SourceResult<Vec<f64>>;

    /// `Ok(None)` means the query worked but no sensor is present.
    fn thermal_zone(&mut self) -> SourceResult<Option<ThermalReading>>;

    fn total_memory_bytes(&mut self) -> SourceResult<u64>;

    fn available_memory_bytes(&mut self) -> SourceResult<u64>;

    fn display_adapters(&mut self) -> SourceResult<Vec<RawAdapter>>;

    fn fixed_volumes(&mut self) -> SourceResult<Vec<RawVolume>>;

    fn active_interfaces(&mut self) -> SourceResult<Vec<String>>;

    fn network_counters(&mut self, interfaces: &[String]) -> SourceResult<NetCounters>;

    fn processes(&mut self) -> SourceResult<Vec<RawProcess>>;

    fn processor_name(&mut self) -> SourceResult<String>;

    fn host(&mut self) -> SourceResult<RawHost>;

    /// Drops OS handles. Reads after this return `SourceError::Released`.
    fn release(&mut self);
}
