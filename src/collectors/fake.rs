use crate::collectors::{
    MediaHint, NetCounters, RawAdapter, RawHost, RawProcess, RawVolume, SourceError,
    SourceResult, SystemSource, ThermalReading,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scripted source for tests. A `None` field makes the matching read fail.
#[derive(Debug, Clone)]
pub struct FakeSource {
    pub logical: usize,
    pub cpu: Option<f64>,
    pub cores: Option<Vec<f64>>,
    pub thermal: Option<Option<ThermalReading>>,
    pub total_memory: Option<u64>,
    pub available_memory: Option<u64>,
    pub adapters: Option<Vec<RawAdapter>>,
    pub volumes: Option<Vec<RawVolume>>,
    pub interfaces: Option<Vec<String>>,
    pub counters: Option<NetCounters>,
    /// Added to `counters` on every refresh.
    pub traffic_per_tick: NetCounters,
    pub processes: Option<Vec<RawProcess>>,
    pub processor: Option<String>,
    pub host: Option<RawHost>,
    pub refreshes: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub total_memory_queries: Arc<AtomicUsize>,
    pub thermal_queries: Arc<AtomicUsize>,
    pub adapter_queries: Arc<AtomicUsize>,
    pub processor_queries: Arc<AtomicUsize>,
    released: bool,
}

const GIB: u64 = 1024 * 1024 * 1024;

impl FakeSource {
    pub fn healthy() -> Self {
        Self {
            logical: 4,
            cpu: Some(25.0),
            cores: Some(vec![10.0, 20.0, 30.0, 40.0]),
            thermal: Some(Some(ThermalReading::DeciKelvin(3232.0))),
            total_memory: Some(16 * GIB),
            available_memory: Some(6 * GIB),
            adapters: Some(vec![RawAdapter {
                name: "NVIDIA GeForce RTX 3070".to_string(),
                memory_total_bytes: 8 * GIB,
                memory_used_bytes: Some(2 * GIB),
                utilization_percent: Some(33.0),
                temperature_celsius: Some(52.0),
            }]),
            volumes: Some(vec![RawVolume {
                volume: "/".to_string(),
                device: "/dev/nvme0n1p2".to_string(),
                total_bytes: 500 * GIB,
                free_bytes: 320 * GIB,
                media: MediaHint::Ssd,
            }]),
            interfaces: Some(vec!["eth0".to_string()]),
            counters: Some(NetCounters::default()),
            traffic_per_tick: NetCounters::default(),
            processes: Some(vec![
                RawProcess {
                    pid: 1,
                    name: "init".to_string(),
                    cpu_percent: 0.5,
                    memory_bytes: 8 * 1024 * 1024,
                    responding: true,
                },
                RawProcess {
                    pid: 420,
                    name: "cargo".to_string(),
                    cpu_percent: 180.0,
                    memory_bytes: 700 * 1024 * 1024,
                    responding: true,
                },
                RawProcess {
                    pid: 421,
                    name: "defunct".to_string(),
                    cpu_percent: 0.0,
                    memory_bytes: 0,
                    responding: false,
                },
            ]),
            processor: Some("AMD Ryzen 7 5800X".to_string()),
            host: Some(RawHost {
                machine_name: "workstation".to_string(),
                os_caption: "Ubuntu 24.04 LTS".to_string(),
                uptime_secs: 7_200,
            }),
            refreshes: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
            total_memory_queries: Arc::new(AtomicUsize::new(0)),
            thermal_queries: Arc::new(AtomicUsize::new(0)),
            adapter_queries: Arc::new(AtomicUsize::new(0)),
            processor_queries: Arc::new(AtomicUsize::new(0)),
            released: false,
        }
    }

    /// Every read fails.
    pub fn broken(logical: usize) -> Self {
        Self {
            logical,
            cpu: None,
            cores: None,
            thermal: None,
            total_memory: None,
            available_memory: None,
            adapters: None,
            volumes: None,
            interfaces: None,
            counters: None,
            processes: None,
            processor: None,
            host: None,
            ..Self::healthy()
        }
    }

    fn read<T: Clone>(&self, what: &str, value: &Option<T>) -> SourceResult<T> {
        if self.released {
            return Err(SourceError::Released);
        }
        value
            .clone()
            .ok_or_else(|| SourceError::Unavailable(format!("fake: {what}")))
    }
}

impl SystemSource for FakeSource {
    fn refresh(&mut self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if let Some(c) = self.counters.as_mut() {
            c.received_bytes += self.traffic_per_tick.received_bytes;
            c.sent_bytes += self.traffic_per_tick.sent_bytes;
        }
    }

    fn logical_processors(&self) -> usize {
        self.logical
    }

    fn cpu_usage(&mut self) -> SourceResult<f64> {
        self.read("cpu", &self.cpu)
    }

    fn core_usages(&mut self) -> SourceResult<Vec<f64>> {
        self.read("cores", &self.cores)
    }

    fn thermal_zone(&mut self) -> SourceResult<Option<ThermalReading>> {
        self.thermal_queries.fetch_add(1, Ordering::SeqCst);
        self.read("thermal", &self.thermal)
    }

    fn total_memory_bytes(&mut self) -> SourceResult<u64> {
        self.total_memory_queries.fetch_add(1, Ordering::SeqCst);
        self.read("total memory", &self.total_memory)
    }

    fn available_memory_bytes(&mut self) -> SourceResult<u64> {
        self.read("available memory", &self.available_memory)
    }

    fn display_adapters(&mut self) -> SourceResult<Vec<RawAdapter>> {
        self.adapter_queries.fetch_add(1, Ordering::SeqCst);
        self.read("adapters", &self.adapters)
    }

    fn fixed_volumes(&mut self) -> SourceResult<Vec<RawVolume>> {
        self.read("volumes", &self.volumes)
    }

    fn active_interfaces(&mut self) -> SourceResult<Vec<String>> {
        self.read("interfaces", &self.interfaces)
    }

    fn network_counters(&mut self, _interfaces: &[String]) -> SourceResult<NetCounters> {
        self.read("counters", &self.counters)
    }

    fn processes(&mut self) -> SourceResult<Vec<RawProcess>> {
        self.read("processes", &self.processes)
    }

    fn processor_name(&mut self) -> SourceResult<String> {
        self.processor_queries.fetch_add(1, Ordering::SeqCst);
        self.read("processor", &self.processor)
    }

    fn host(&mut self) -> SourceResult<RawHost> {
        self.read("host", &self.host)
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.released = true;
    }
}
