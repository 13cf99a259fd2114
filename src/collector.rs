use crate::collectors::gpu::Activity;
use crate::collectors::{
    cpu, gpu, host, memory, network, process, storage, NetCounters, SourceResult, SystemSource,
};
use crate::config::Config;
use crate::snapshot::{CpuSample, NetworkSample, Origin, Sampled, Snapshot, SourceReport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub top_processes: usize,
    pub simulate_gpu_activity: bool,
}

impl From<&Config> for CollectorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            top_processes: cfg.top_processes,
            simulate_gpu_activity: cfg.simulate_gpu_activity,
        }
    }
}

/// Owns the source and all per-host state carried between ticks.
pub struct Collector<S: SystemSource> {
    source: S,
    settings: CollectorSettings,
    logical_cores: usize,
    interfaces: Vec<String>,
    net_baseline: Option<(NetCounters, Instant)>,
    total_memory: Option<u64>,
    processor_name: Option<String>,
    /// Set when the source reported no sensor at init; later ticks skip the query.
    thermal_absent: bool,
    /// Set when no hardware adapter was listed at init.
    gpu_absent: bool,
    rng: StdRng,
    sequence: u64,
    degraded: HashSet<&'static str>,
    torn_down: bool,
}

impl<S: SystemSource> Collector<S> {
    pub fn new(mut source: S, settings: CollectorSettings) -> Self {
        let logical_cores = source.logical_processors().max(1);

        let interfaces = match source.active_interfaces() {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "не удалось перечислить сетевые интерфейсы");
                Vec::new()
            }
        };

        let net_baseline = match source.network_counters(&interfaces) {
            Ok(counters) => Some((counters, Instant::now())),
            Err(err) => {
                warn!(error = %err, "не удалось снять базовые счётчики сети");
                None
            }
        };

        let mut collector = Self {
            source,
            settings,
            logical_cores,
            interfaces,
            net_baseline,
            total_memory: None,
            processor_name: None,
            thermal_absent: false,
            gpu_absent: false,
            rng: StdRng::from_entropy(),
            sequence: 0,
            degraded: HashSet::new(),
            torn_down: false,
        };

        if let Err(err) = collector.cached_total_memory() {
            warn!(error = %err, "не удалось определить объём физической памяти");
        }
        if let Err(err) = collector.cached_processor_name() {
            warn!(error = %err, "не удалось определить модель процессора");
        }

        match collector.source.thermal_zone() {
            Ok(None) => {
                info!("датчик температуры CPU не найден, используется оценка по загрузке");
                collector.thermal_absent = true;
            }
            Ok(Some(_)) => {}
            Err(err) => warn!(error = %err, "не удалось опросить датчик температуры CPU"),
        }

        match collector.source.display_adapters() {
            Ok(list) if gpu::select_adapter(list.clone()).is_none() => {
                info!("аппаратный видеоадаптер не найден, используются резервные значения GPU");
                collector.gpu_absent = true;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "не удалось опросить видеоадаптеры"),
        }

        info!(
            logical_cores = collector.logical_cores,
            interfaces = collector.interfaces.len(),
            "сборщик метрик инициализирован"
        );
        collector
    }

    /// One sampling pass. Never fails: every group that cannot be read is
    /// replaced with its fallback and tagged in `sources`.
    pub fn sample(&mut self) -> Snapshot {
        let started = Instant::now();
        self.source.refresh();

        let cpu_usage = cpu::sample_usage(self.source.cpu_usage());
        let cores = cpu::sample_cores(self.source.core_usages(), self.logical_cores);
        let thermal = if self.thermal_absent {
            Ok(None)
        } else {
            self.source.thermal_zone()
        };
        let cpu_temperature = cpu::sample_temperature(thermal, cpu_usage.value);

        let total = self.cached_total_memory();
        let memory = memory::sample(total, self.source.available_memory_bytes());

        let activity = if self.settings.simulate_gpu_activity {
            Activity::Simulate {
                jitter: self.rng.gen_range(-10.0..=10.0),
            }
        } else {
            Activity::Disabled
        };
        let adapters = if self.gpu_absent {
            Ok(Vec::new())
        } else {
            self.source.display_adapters()
        };
        let gpu = gpu::sample(adapters, cpu_usage.value, activity);

        let disks = storage::sample(self.source.fixed_volumes());
        let net = self.sample_network();
        let processes = process::sample(
            self.source.processes(),
            self.settings.top_processes,
            self.logical_cores,
        );

        if self.processor_name.is_none() {
            if let Err(err) = self.cached_processor_name() {
                debug!(error = %err, "модель процессора по-прежнему недоступна");
            }
        }
        let now = now_unix();
        let host = host::sample(self.source.host(), self.processor_name.as_deref(), now);

        let sources = SourceReport {
            cpu_usage: cpu_usage.origin,
            cpu_cores: cores.origin,
            cpu_temperature: cpu_temperature.origin,
            memory: memory.origin,
            gpu_adapter: gpu.adapter,
            gpu_activity: gpu.activity,
            storage: disks.origin,
            network: net.origin,
            processes: processes.origin,
            host: host.origin,
        };
        self.log_transitions(&sources);

        self.sequence += 1;
        debug!(
            sequence = self.sequence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "снимок метрик собран"
        );

        Snapshot {
            sequence: self.sequence,
            taken_at_unix: now,
            cpu: CpuSample {
                usage_percent: cpu_usage.value,
                core_usage_percent: cores.value,
                temperature_celsius: cpu_temperature.value,
            },
            memory: memory.value,
            gpu: gpu.sample,
            disks: disks.value,
            network: net.value,
            processes: processes.value,
            host: host.value,
            sources,
        }
    }

    /// Releases the source. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.source.release();
        info!(ticks = self.sequence, "сборщик метрик остановлен");
    }

    fn cached_total_memory(&mut self) -> SourceResult<u64> {
        if let Some(total) = self.total_memory {
            return Ok(total);
        }
        let total = self.source.total_memory_bytes()?;
        if total > 0 {
            self.total_memory = Some(total);
        }
        Ok(total)
    }

    fn cached_processor_name(&mut self) -> SourceResult<&str> {
        if self.processor_name.is_none() {
            self.processor_name = Some(self.source.processor_name()?);
        }
        Ok(self.processor_name.as_deref().unwrap_or_default())
    }

    fn sample_network(&mut self) -> Sampled<NetworkSample> {
        let read_at = Instant::now();
        let current = self.source.network_counters(&self.interfaces);
        let fresh = current.as_ref().ok().copied();

        let (baseline, elapsed) = match self.net_baseline {
            Some((counters, at)) => (
                Some(counters),
                read_at.saturating_duration_since(at).as_secs_f64(),
            ),
            None => (None, 0.0),
        };
        let sampled = network::sample(baseline, current, elapsed, self.interfaces.len());

        if let Some(counters) = fresh {
            self.net_baseline = Some((counters, read_at));
        }
        sampled
    }

    fn log_transitions(&mut self, report: &SourceReport) {
        for (group, origin) in report.entries() {
            let was_degraded = self.degraded.contains(group);
            match origin {
                Origin::Fallback { reason } if !was_degraded => {
                    warn!(group, reason = %reason, "группа метрик перешла на резервные значения");
                    self.degraded.insert(group);
                }
                Origin::Fallback { reason } => {
                    debug!(group, reason = %reason, "группа метрик остаётся на резервных значениях");
                }
                _ if was_degraded => {
                    info!(group, "группа метрик снова получает живые данные");
                    self.degraded.remove(group);
                }
                _ => {}
            }
        }
    }
}

impl<S: SystemSource> Drop for Collector<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::FakeSource;
    use crate::collectors::RawAdapter;
    use crate::snapshot::{ConnectionStatus, MediaType};
    use std::sync::atomic::Ordering;

    fn settings() -> CollectorSettings {
        CollectorSettings {
            top_processes: 10,
            simulate_gpu_activity: true,
        }
    }

    fn assert_percent(v: f64) {
        assert!((0.0..=100.0).contains(&v), "{v} вне диапазона 0..100");
    }

    fn assert_snapshot_in_range(s: &Snapshot) {
        assert_percent(s.cpu.usage_percent);
        s.cpu.core_usage_percent.iter().copied().for_each(assert_percent);
        assert_percent(s.memory.usage_percent);
        assert_percent(s.gpu.usage_percent);
        for d in &s.disks {
            assert_percent(d.usage_percent);
            assert!(d.used_gb >= 0.0 && d.free_gb >= 0.0 && d.total_gb >= 0.0);
            assert!((d.used_gb + d.free_gb - d.total_gb).abs() < 0.11);
        }
        for p in &s.processes.top {
            assert_percent(p.cpu_percent);
            assert!(!p.name.is_empty());
        }
        assert!(s.memory.used_gb >= 0.0 && s.memory.available_gb >= 0.0);
        assert!(s.network.download_mbps >= 0.0 && s.network.upload_mbps >= 0.0);
    }

    #[test]
    fn healthy_source_produces_live_snapshot() {
        let mut collector = Collector::new(FakeSource::healthy(), settings());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let s = collector.sample();

        assert_eq!(s.sequence, 1);
        assert_eq!(s.cpu.usage_percent, 25.0);
        assert_eq!(s.cpu.core_usage_percent, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(s.cpu.temperature_celsius, 50.0);
        assert_eq!(s.memory.total_gb, 16.0);
        assert_eq!(s.memory.used_gb, 10.0);
        assert_eq!(s.gpu.name, "NVIDIA GeForce RTX 3070");
        assert_eq!(s.gpu.usage_percent, 33.0);
        assert_eq!(s.disks.len(), 1);
        assert_eq!(s.disks[0].media_type, MediaType::NvmeSsd);
        assert_eq!(s.network.status, ConnectionStatus::Connected);
        assert_eq!(s.processes.total, 3);
        assert_eq!(s.processes.responding, 2);
        assert_eq!(s.processes.top[0].name, "cargo");
        assert_eq!(s.processes.top[0].cpu_percent, 45.0);
        assert_eq!(s.host.processor_name, "AMD Ryzen 7 5800X");
        assert_eq!(s.host.machine_name, "workstation");
        assert!(s.sources.entries().iter().all(|(_, o)| o.is_live()));
        assert_snapshot_in_range(&s);
    }

    #[test]
    fn broken_source_still_emits_full_snapshot() {
        let mut collector = Collector::new(FakeSource::broken(6), settings());
        for _ in 0..3 {
            let s = collector.sample();
            assert_eq!(s.cpu.core_usage_percent, vec![0.0; 6]);
            assert_eq!(s.memory, memory::fallback_sample());
            assert_eq!(s.disks, vec![storage::synthetic_volume()]);
            assert_eq!(s.processes, process::fallback_sample());
            assert_eq!(s.gpu.name, gpu::PLACEHOLDER_NAME);
            assert_eq!(s.network.download_mbps, network::FALLBACK_DOWNLOAD_MBPS);
            assert_eq!(s.network.status, ConnectionStatus::Disconnected);
            assert_eq!(s.host.machine_name, host::FALLBACK_MACHINE_NAME);
            assert_eq!(
                s.sources.gpu_activity,
                Origin::Simulated {
                    method: gpu::USAGE_SIMULATION
                }
            );
            assert!(s.sources.memory.is_fallback());
            assert!(!s.sources.cpu_temperature.is_live());
            assert_snapshot_in_range(&s);
        }
    }

    #[test]
    fn core_array_always_matches_detected_count() {
        let mut source = FakeSource::healthy();
        source.logical = 8;
        let mut collector = Collector::new(source, settings());
        let s = collector.sample();
        assert_eq!(s.cpu.core_usage_percent.len(), 8);
        assert!(s.sources.cpu_cores.is_fallback());
    }

    #[test]
    fn total_memory_is_cached_after_first_success() {
        let source = FakeSource::healthy();
        let queries = source.total_memory_queries.clone();
        let mut collector = Collector::new(source, settings());
        for _ in 0..3 {
            collector.sample();
        }
        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn network_rate_uses_previous_tick_as_baseline() {
        let mut source = FakeSource::healthy();
        source.traffic_per_tick = NetCounters {
            received_bytes: 1_000,
            sent_bytes: 0,
        };
        let mut collector = Collector::new(source, settings());
        let first = collector.sample();
        let second = collector.sample();
        assert_eq!(first.network.bytes_received, 1_000);
        assert_eq!(second.network.bytes_received, 2_000);
        assert_eq!(second.network.upload_mbps, 0.0);
        assert!(second.network.download_mbps >= 0.0);
    }

    #[test]
    fn disabled_gpu_simulation_reports_zero_usage() {
        let mut source = FakeSource::healthy();
        source.adapters = Some(vec![RawAdapter {
            name: "Microsoft Basic Display Adapter".to_string(),
            memory_total_bytes: 0,
            memory_used_bytes: None,
            utilization_percent: None,
            temperature_celsius: None,
        }]);
        let mut collector = Collector::new(
            source,
            CollectorSettings {
                top_processes: 10,
                simulate_gpu_activity: false,
            },
        );
        let s = collector.sample();
        assert_eq!(s.gpu.name, gpu::PLACEHOLDER_NAME);
        assert_eq!(s.gpu.vram_total_gb, 16.0);
        assert_eq!(s.gpu.usage_percent, 0.0);
        assert!(s.sources.gpu_activity.is_fallback());
    }

    #[test]
    fn simulated_gpu_usage_stays_in_range() {
        let mut source = FakeSource::healthy();
        source.adapters = Some(vec![]);
        source.cpu = Some(100.0);
        let mut collector = Collector::new(source, settings());
        for _ in 0..50 {
            let s = collector.sample();
            assert_percent(s.gpu.usage_percent);
            assert!(s.gpu.usage_percent >= 90.0);
            assert_eq!(
                s.sources.gpu_activity,
                Origin::Simulated {
                    method: gpu::USAGE_SIMULATION
                }
            );
        }
    }

    #[test]
    fn missing_thermal_sensor_is_queried_once() {
        let mut source = FakeSource::healthy();
        source.thermal = Some(None);
        let queries = source.thermal_queries.clone();
        let mut collector = Collector::new(source, settings());
        for _ in 0..5 {
            let s = collector.sample();
            assert!(matches!(s.sources.cpu_temperature, Origin::Estimated { .. }));
        }
        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_thermal_query_keeps_retrying() {
        let mut source = FakeSource::healthy();
        source.thermal = None;
        let queries = source.thermal_queries.clone();
        let mut collector = Collector::new(source, settings());
        for _ in 0..3 {
            collector.sample();
        }
        assert_eq!(queries.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn software_only_adapters_are_queried_once() {
        let mut source = FakeSource::healthy();
        source.adapters = Some(vec![RawAdapter {
            name: "llvmpipe (LLVM 17.0.6, 256 bits)".to_string(),
            memory_total_bytes: 0,
            memory_used_bytes: None,
            utilization_percent: None,
            temperature_celsius: None,
        }]);
        let queries = source.adapter_queries.clone();
        let mut collector = Collector::new(source, settings());
        for _ in 0..5 {
            let s = collector.sample();
            assert_eq!(s.gpu.name, gpu::PLACEHOLDER_NAME);
            assert!(s.sources.gpu_adapter.is_fallback());
        }
        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn present_adapter_is_read_every_tick() {
        let source = FakeSource::healthy();
        let queries = source.adapter_queries.clone();
        let mut collector = Collector::new(source, settings());
        for _ in 0..3 {
            collector.sample();
        }
        assert_eq!(queries.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn processor_name_is_retried_until_found() {
        let mut source = FakeSource::healthy();
        source.processor = None;
        let queries = source.processor_queries.clone();
        let mut collector = Collector::new(source, settings());

        let s = collector.sample();
        assert_eq!(s.host.processor_name, host::FALLBACK_PROCESSOR_NAME);

        collector.source.processor = Some("Intel Core Ultra 7 155H".to_string());
        let s = collector.sample();
        assert_eq!(s.host.processor_name, "Intel Core Ultra 7 155H");
        collector.sample();
        assert_eq!(queries.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn teardown_is_idempotent() {
        let source = FakeSource::healthy();
        let releases = source.releases.clone();
        let mut collector = Collector::new(source, settings());
        collector.teardown();
        collector.teardown();
        drop(collector);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn degradation_is_tracked_per_group() {
        let mut collector = Collector::new(FakeSource::healthy(), settings());
        collector.sample();
        assert!(collector.degraded.is_empty());

        collector.source.volumes = None;
        collector.sample();
        assert!(collector.degraded.contains("storage"));

        collector.source.volumes = Some(vec![]);
        collector.sample();
        assert!(collector.degraded.contains("storage"));

        collector.source.volumes = FakeSource::healthy().volumes;
        collector.sample();
        assert!(!collector.degraded.contains("storage"));
    }
}
