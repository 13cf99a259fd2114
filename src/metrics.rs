use crate::snapshot::{ConnectionStatus, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub cpu_usage_percent: Gauge,
    pub cpu_core_usage_percent: GaugeVec,
    pub cpu_temperature_celsius: Gauge,
    pub memory_total_gigabytes: Gauge,
    pub memory_used_gigabytes: Gauge,
    pub memory_available_gigabytes: Gauge,
    pub memory_usage_percent: Gauge,
    pub gpu_usage_percent: GaugeVec,
    pub gpu_temperature_celsius: GaugeVec,
    pub gpu_vram_total_gigabytes: GaugeVec,
    pub gpu_vram_used_gigabytes: GaugeVec,
    pub disk_total_gigabytes: GaugeVec,
    pub disk_used_gigabytes: GaugeVec,
    pub disk_free_gigabytes: GaugeVec,
    pub disk_usage_percent: GaugeVec,
    pub network_download_mbps: Gauge,
    pub network_upload_mbps: Gauge,
    pub network_received_bytes: Gauge,
    pub network_sent_bytes: Gauge,
    pub network_connected: Gauge,
    pub process_count: Gauge,
    pub process_responding_count: Gauge,
    pub host_uptime_seconds: Gauge,
    pub host_info: GaugeVec,
    pub source_live: GaugeVec,
    pub fallback_total: CounterVec,
    pub ticks_total: Counter,
    pub last_collect_timestamp_seconds: Gauge,
    pub scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let cpu_usage_percent = Gauge::with_opts(opts!(
            "sysprobe_cpu_usage_percent",
            "Total CPU usage in percent (0..100)"
        ))?;
        let cpu_core_usage_percent = GaugeVec::new(
            opts!(
                "sysprobe_cpu_core_usage_percent",
                "CPU usage per logical core in percent"
            ),
            &["core"],
        )?;
        let cpu_temperature_celsius = Gauge::with_opts(opts!(
            "sysprobe_cpu_temperature_celsius",
            "CPU temperature in Celsius (estimated when no sensor is present)"
        ))?;
        let memory_total_gigabytes = Gauge::with_opts(opts!(
            "sysprobe_memory_total_gigabytes",
            "Total physical memory in GB"
        ))?;
        let memory_used_gigabytes = Gauge::with_opts(opts!(
            "sysprobe_memory_used_gigabytes",
            "Used physical memory in GB"
        ))?;
        let memory_available_gigabytes = Gauge::with_opts(opts!(
            "sysprobe_memory_available_gigabytes",
            "Available physical memory in GB"
        ))?;
        let memory_usage_percent = Gauge::with_opts(opts!(
            "sysprobe_memory_usage_percent",
            "Physical memory usage in percent"
        ))?;
        let gpu_usage_percent = GaugeVec::new(
            opts!("sysprobe_gpu_usage_percent", "GPU usage in percent"),
            &["name"],
        )?;
        let gpu_temperature_celsius = GaugeVec::new(
            opts!(
                "sysprobe_gpu_temperature_celsius",
                "GPU temperature in Celsius"
            ),
            &["name"],
        )?;
        let gpu_vram_total_gigabytes = GaugeVec::new(
            opts!("sysprobe_gpu_vram_total_gigabytes", "GPU memory total in GB"),
            &["name"],
        )?;
        let gpu_vram_used_gigabytes = GaugeVec::new(
            opts!("sysprobe_gpu_vram_used_gigabytes", "GPU memory used in GB"),
            &["name"],
        )?;
        let disk_total_gigabytes = GaugeVec::new(
            opts!(
                "sysprobe_disk_total_gigabytes",
                "Fixed volume size in GB"
            ),
            &["volume", "media"],
        )?;
        let disk_used_gigabytes = GaugeVec::new(
            opts!("sysprobe_disk_used_gigabytes", "Fixed volume used space in GB"),
            &["volume", "media"],
        )?;
        let disk_free_gigabytes = GaugeVec::new(
            opts!("sysprobe_disk_free_gigabytes", "Fixed volume free space in GB"),
            &["volume", "media"],
        )?;
        let disk_usage_percent = GaugeVec::new(
            opts!(
                "sysprobe_disk_usage_percent",
                "Fixed volume usage in percent"
            ),
            &["volume", "media"],
        )?;
        let network_download_mbps = Gauge::with_opts(opts!(
            "sysprobe_network_download_mbps",
            "Receive rate across tracked interfaces in Mbit/s"
        ))?;
        let network_upload_mbps = Gauge::with_opts(opts!(
            "sysprobe_network_upload_mbps",
            "Transmit rate across tracked interfaces in Mbit/s"
        ))?;
        let network_received_bytes = Gauge::with_opts(opts!(
            "sysprobe_network_received_bytes",
            "Bytes received across tracked interfaces"
        ))?;
        let network_sent_bytes = Gauge::with_opts(opts!(
            "sysprobe_network_sent_bytes",
            "Bytes sent across tracked interfaces"
        ))?;
        let network_connected = Gauge::with_opts(opts!(
            "sysprobe_network_connected",
            "1 when at least one active non-loopback interface is tracked"
        ))?;
        let process_count =
            Gauge::with_opts(opts!("sysprobe_process_count", "Number of processes"))?;
        let process_responding_count = Gauge::with_opts(opts!(
            "sysprobe_process_responding_count",
            "Number of processes that are not zombie, dead, stopped or traced"
        ))?;
        let host_uptime_seconds = Gauge::with_opts(opts!(
            "sysprobe_host_uptime_seconds",
            "Host uptime in seconds"
        ))?;
        let host_info = GaugeVec::new(
            opts!("sysprobe_host_info", "Host identity, value is always 1"),
            &["machine", "os", "processor"],
        )?;
        let source_live = GaugeVec::new(
            opts!(
                "sysprobe_source_live",
                "1 when the metric group came from a live source on the last tick"
            ),
            &["group"],
        )?;
        let fallback_total = CounterVec::new(
            opts!(
                "sysprobe_fallback_total",
                "Ticks on which a metric group used its fallback value"
            ),
            &["group"],
        )?;
        let ticks_total =
            Counter::with_opts(opts!("sysprobe_ticks_total", "Number of sampling passes"))?;
        let last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "sysprobe_last_collect_timestamp_seconds",
            "Unix time of the last snapshot"
        ))?;
        let scrape_count_total = Counter::with_opts(opts!(
            "sysprobe_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &cpu_usage_percent)?;
        register(&registry, &cpu_core_usage_percent)?;
        register(&registry, &cpu_temperature_celsius)?;
        register(&registry, &memory_total_gigabytes)?;
        register(&registry, &memory_used_gigabytes)?;
        register(&registry, &memory_available_gigabytes)?;
        register(&registry, &memory_usage_percent)?;
        register(&registry, &gpu_usage_percent)?;
        register(&registry, &gpu_temperature_celsius)?;
        register(&registry, &gpu_vram_total_gigabytes)?;
        register(&registry, &gpu_vram_used_gigabytes)?;
        register(&registry, &disk_total_gigabytes)?;
        register(&registry, &disk_used_gigabytes)?;
        register(&registry, &disk_free_gigabytes)?;
        register(&registry, &disk_usage_percent)?;
        register(&registry, &network_download_mbps)?;
        register(&registry, &network_upload_mbps)?;
        register(&registry, &network_received_bytes)?;
        register(&registry, &network_sent_bytes)?;
        register(&registry, &network_connected)?;
        register(&registry, &process_count)?;
        register(&registry, &process_responding_count)?;
        register(&registry, &host_uptime_seconds)?;
        register(&registry, &host_info)?;
        register(&registry, &source_live)?;
        register(&registry, &fallback_total)?;
        register(&registry, &ticks_total)?;
        register(&registry, &last_collect_timestamp_seconds)?;
        register(&registry, &scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            cpu_usage_percent,
            cpu_core_usage_percent,
            cpu_temperature_celsius,
            memory_total_gigabytes,
            memory_used_gigabytes,
            memory_available_gigabytes,
            memory_usage_percent,
            gpu_usage_percent,
            gpu_temperature_celsius,
            gpu_vram_total_gigabytes,
            gpu_vram_used_gigabytes,
            disk_total_gigabytes,
            disk_used_gigabytes,
            disk_free_gigabytes,
            disk_usage_percent,
            network_download_mbps,
            network_upload_mbps,
            network_received_bytes,
            network_sent_bytes,
            network_connected,
            process_count,
            process_responding_count,
            host_uptime_seconds,
            host_info,
            source_live,
            fallback_total,
            ticks_total,
            last_collect_timestamp_seconds,
            scrape_count_total,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot) {
        self.cpu_usage_percent.set(snapshot.cpu.usage_percent);
        self.cpu_core_usage_percent.reset();
        for (idx, usage) in snapshot.cpu.core_usage_percent.iter().enumerate() {
            self.cpu_core_usage_percent
                .with_label_values(&[&idx.to_string()])
                .set(*usage);
        }
        self.cpu_temperature_celsius
            .set(snapshot.cpu.temperature_celsius);

        self.memory_total_gigabytes.set(snapshot.memory.total_gb);
        self.memory_used_gigabytes.set(snapshot.memory.used_gb);
        self.memory_available_gigabytes
            .set(snapshot.memory.available_gb);
        self.memory_usage_percent.set(snapshot.memory.usage_percent);

        // Adapter name can change between ticks (live adapter vs placeholder).
        self.gpu_usage_percent.reset();
        self.gpu_temperature_celsius.reset();
        self.gpu_vram_total_gigabytes.reset();
        self.gpu_vram_used_gigabytes.reset();
        let gpu = &snapshot.gpu;
        let name = gpu.name.as_str();
        self.gpu_usage_percent
            .with_label_values(&[name])
            .set(gpu.usage_percent);
        self.gpu_temperature_celsius
            .with_label_values(&[name])
            .set(gpu.temperature_celsius);
        self.gpu_vram_total_gigabytes
            .with_label_values(&[name])
            .set(gpu.vram_total_gb);
        self.gpu_vram_used_gigabytes
            .with_label_values(&[name])
            .set(gpu.vram_used_gb);

        self.disk_total_gigabytes.reset();
        self.disk_used_gigabytes.reset();
        self.disk_free_gigabytes.reset();
        self.disk_usage_percent.reset();
        for d in &snapshot.disks {
            let labels = [d.volume.as_str(), d.media_type.label()];
            self.disk_total_gigabytes
                .with_label_values(&labels)
                .set(d.total_gb);
            self.disk_used_gigabytes
                .with_label_values(&labels)
                .set(d.used_gb);
            self.disk_free_gigabytes
                .with_label_values(&labels)
                .set(d.free_gb);
            self.disk_usage_percent
                .with_label_values(&labels)
                .set(d.usage_percent);
        }

        let net = &snapshot.network;
        self.network_download_mbps.set(net.download_mbps);
        self.network_upload_mbps.set(net.upload_mbps);
        self.network_received_bytes.set(net.bytes_received as f64);
        self.network_sent_bytes.set(net.bytes_sent as f64);
        self.network_connected
            .set(if net.status == ConnectionStatus::Connected {
                1.0
            } else {
                0.0
            });

        self.process_count.set(snapshot.processes.total as f64);
        self.process_responding_count
            .set(snapshot.processes.responding as f64);

        let host = &snapshot.host;
        self.host_uptime_seconds.set(host.uptime_secs as f64);
        self.host_info.reset();
        self.host_info
            .with_label_values(&[
                host.machine_name.as_str(),
                host.os_caption.as_str(),
                host.processor_name.as_str(),
            ])
            .set(1.0);

        for (group, origin) in snapshot.sources.entries() {
            self.source_live
                .with_label_values(&[group])
                .set(if origin.is_live() { 1.0 } else { 0.0 });
            if origin.is_fallback() {
                self.fallback_total.with_label_values(&[group]).inc();
            }
        }

        self.ticks_total.inc();
        self.last_collect_timestamp_seconds
            .set(snapshot.taken_at_unix as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::tests::snapshot;
    use crate::snapshot::Origin;

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().expect("кодирование")).expect("utf-8")
    }

    #[test]
    fn snapshot_fills_gauges() {
        let metrics = Metrics::new().expect("инициализация метрик");
        metrics.update_from_snapshot(&snapshot(1));
        let text = encoded(&metrics);

        assert!(text.contains("sysprobe_cpu_usage_percent 25"));
        assert!(text.contains("sysprobe_cpu_core_usage_percent{core=\"3\"} 40"));
        assert!(text.contains("sysprobe_memory_total_gigabytes 16"));
        assert!(text.contains("sysprobe_disk_usage_percent{media=\"NVMe SSD\",volume=\"/\"}"));
        assert!(text.contains("sysprobe_source_live{group=\"storage\"} 1"));
        assert!(text.contains("sysprobe_ticks_total 1"));
    }

    #[test]
    fn fallback_groups_are_counted() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let mut s = (*snapshot(1)).clone();
        s.sources.memory = Origin::fallback("нет данных");
        metrics.update_from_snapshot(&s);
        metrics.update_from_snapshot(&s);
        let text = encoded(&metrics);

        assert!(text.contains("sysprobe_source_live{group=\"memory\"} 0"));
        assert!(text.contains("sysprobe_fallback_total{group=\"memory\"} 2"));
        assert!(!text.contains("sysprobe_fallback_total{group=\"cpu_usage\"}"));
        assert!(text.contains("sysprobe_ticks_total 2"));
    }

    #[test]
    fn disks_from_previous_tick_are_dropped() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let mut s = (*snapshot(1)).clone();
        metrics.update_from_snapshot(&s);
        s.disks[0].volume = "/data".to_string();
        metrics.update_from_snapshot(&s);
        let text = encoded(&metrics);

        assert!(text.contains("volume=\"/data\""));
        assert!(!text.contains("volume=\"/\""));
    }
}
