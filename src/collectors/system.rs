use crate::collectors::command::{run_with_timeout, CommandOutput};
#[cfg(target_os = "windows")]
use crate::collectors::command::parse_f64_loose;
use crate::collectors::command::parse_u64_loose;
use crate::collectors::network::is_tracked_interface;
use crate::collectors::{
    MediaHint, NetCounters, RawAdapter, RawHost, RawProcess, RawVolume, SourceError,
    SourceResult, SystemSource, ThermalReading,
};
use std::collections::HashSet;
#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use sysinfo::{
    ComponentExt, CpuExt, DiskExt, DiskKind, NetworkExt, NetworksExt, PidExt, ProcessExt,
    ProcessStatus, System, SystemExt,
};
use tracing::debug;

const SKIPPED_FILE_SYSTEMS: [&str; 4] = ["squashfs", "overlay", "tmpfs", "devtmpfs"];
const CPU_SENSOR_MARKERS: [&str; 7] = [
    "cpu", "package", "tctl", "tdie", "coretemp", "k10temp", "x86_pkg",
];

/// `SystemSource` backed by sysinfo, plus platform queries for what sysinfo
/// does not cover (ACPI thermal zones, display adapters).
pub struct SysinfoSource {
    system: Option<System>,
    query_timeout: Duration,
}

impl SysinfoSource {
    pub fn new(query_timeout: Duration) -> Self {
        let mut system = System::new_all();
        system.refresh_components_list();
        Self {
            system: Some(system),
            query_timeout,
        }
    }

    fn sys(&self) -> SourceResult<&System> {
        self.system.as_ref().ok_or(SourceError::Released)
    }

    fn sys_mut(&mut self) -> SourceResult<&mut System> {
        self.system.as_mut().ok_or(SourceError::Released)
    }
}

impl SystemSource for SysinfoSource {
    fn refresh(&mut self) {
        let Some(system) = self.system.as_mut() else {
            return;
        };
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_processes();
        system.refresh_disks_list();
        system.refresh_disks();
        system.refresh_networks();
        system.refresh_components();
    }

    fn logical_processors(&self) -> usize {
        let from_sysinfo = self.system.as_ref().map(|s| s.cpus().len()).unwrap_or(0);
        if from_sysinfo > 0 {
            return from_sysinfo;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn cpu_usage(&mut self) -> SourceResult<f64> {
        let sys = self.sys()?;
        if sys.cpus().is_empty() {
            return Err(SourceError::Unavailable("счётчики CPU не найдены".to_string()));
        }
        Ok(sys.global_cpu_info().cpu_usage() as f64)
    }

    fn core_usages(&mut self) -> SourceResult<Vec<f64>> {
        let sys = self.sys()?;
        if sys.cpus().is_empty() {
            return Err(SourceError::Unavailable(
                "счётчики ядер CPU не найдены".to_string(),
            ));
        }
        Ok(sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect())
    }

    fn thermal_zone(&mut self) -> SourceResult<Option<ThermalReading>> {
        let timeout = self.query_timeout;
        let sys = self.sys()?;

        let platform = platform_thermal_zone(timeout);
        match platform {
            Ok(Some(reading)) => return Ok(Some(reading)),
            Ok(None) => {}
            Err(err) => debug!(error = %err, "платформенный датчик температуры недоступен"),
        }

        Ok(cpu_component_temperature(sys).map(ThermalReading::Celsius))
    }

    fn total_memory_bytes(&mut self) -> SourceResult<u64> {
        Ok(self.sys()?.total_memory())
    }

    fn available_memory_bytes(&mut self) -> SourceResult<u64> {
        Ok(self.sys()?.available_memory())
    }

    fn display_adapters(&mut self) -> SourceResult<Vec<RawAdapter>> {
        self.sys()?;
        let timeout = self.query_timeout;
        let readers: [fn(Duration) -> SourceResult<Vec<RawAdapter>>; 2] =
            [collect_nvidia_smi, collect_platform_adapters];

        let mut answered = false;
        let mut last_err = None;
        for read in readers {
            match read(timeout) {
                Ok(list) if !list.is_empty() => return Ok(list),
                Ok(_) => answered = true,
                Err(err) => {
                    debug!(error = %err, "источник видеоадаптеров не ответил");
                    last_err = Some(err);
                }
            }
        }

        match (answered, last_err) {
            (false, Some(err)) => Err(err),
            _ => Ok(Vec::new()),
        }
    }

    fn fixed_volumes(&mut self) -> SourceResult<Vec<RawVolume>> {
        let sys = self.sys()?;
        let mut seen_devices = HashSet::new();
        let volumes = sys
            .disks()
            .iter()
            .filter(|d| !d.is_removable() && d.total_space() > 0)
            .filter(|d| {
                let fs = String::from_utf8_lossy(d.file_system()).to_lowercase();
                !SKIPPED_FILE_SYSTEMS.contains(&fs.as_str())
            })
            .filter(|d| seen_devices.insert(d.name().to_os_string()))
            .map(|d| RawVolume {
                volume: volume_label(&d.mount_point().to_string_lossy()),
                device: d.name().to_string_lossy().to_string(),
                total_bytes: d.total_space(),
                free_bytes: d.available_space(),
                media: match d.kind() {
                    DiskKind::SSD => MediaHint::Ssd,
                    DiskKind::HDD => MediaHint::Hdd,
                    DiskKind::Unknown(_) => MediaHint::Unknown,
                },
            })
            .collect();
        Ok(volumes)
    }

    fn active_interfaces(&mut self) -> SourceResult<Vec<String>> {
        let sys = self.sys_mut()?;
        sys.refresh_networks_list();
        Ok(sys
            .networks()
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| is_tracked_interface(name, interface_operstate(name).as_deref()))
            .collect())
    }

    fn network_counters(&mut self, interfaces: &[String]) -> SourceResult<NetCounters> {
        let sys = self.sys()?;
        let mut counters = NetCounters::default();
        for (name, data) in sys.networks().iter() {
            if !interfaces.iter().any(|i| i == name) {
                continue;
            }
            counters.received_bytes = counters
                .received_bytes
                .saturating_add(data.total_received());
            counters.sent_bytes = counters.sent_bytes.saturating_add(data.total_transmitted());
        }
        Ok(counters)
    }

    fn processes(&mut self) -> SourceResult<Vec<RawProcess>> {
        let sys = self.sys()?;
        if sys.processes().is_empty() {
            return Err(SourceError::Unavailable("таблица процессов пуста".to_string()));
        }
        Ok(sys
            .processes()
            .values()
            .map(|p| RawProcess {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu_percent: p.cpu_usage() as f64,
                memory_bytes: p.memory(),
                responding: !matches!(
                    p.status(),
                    ProcessStatus::Zombie
                        | ProcessStatus::Dead
                        | ProcessStatus::Stop
                        | ProcessStatus::Tracing
                ),
            })
            .collect())
    }

    fn processor_name(&mut self) -> SourceResult<String> {
        let sys = self.sys()?;
        sys.cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SourceError::Unavailable("имя процессора не найдено".to_string()))
    }

    fn host(&mut self) -> SourceResult<RawHost> {
        let sys = self.sys()?;
        let machine_name = sys
            .host_name()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SourceError::Unavailable("имя хоста не найдено".to_string()))?;
        let os_caption = sys
            .long_os_version()
            .or_else(|| sys.name())
            .ok_or_else(|| SourceError::Unavailable("версия ОС не найдена".to_string()))?;
        Ok(RawHost {
            machine_name,
            os_caption,
            uptime_secs: sys.uptime(),
        })
    }

    fn release(&mut self) {
        if self.system.take().is_some() {
            debug!("ресурсы sysinfo освобождены");
        }
    }
}

fn volume_label(mount: &str) -> String {
    let trimmed = mount.trim_end_matches('\\');
    if trimmed.is_empty() {
        mount.to_string()
    } else {
        trimmed.to_string()
    }
}

fn cpu_component_temperature(sys: &System) -> Option<f64> {
    sys.components()
        .iter()
        .filter(|c| {
            let label = c.label().to_lowercase();
            CPU_SENSOR_MARKERS.iter().any(|m| label.contains(m)) && !label.contains("gpu")
        })
        .map(|c| c.temperature() as f64)
        .filter(|t| t.is_finite() && *t > 0.0)
        .max_by(|a, b| a.total_cmp(b))
}

#[cfg(target_os = "linux")]
fn interface_operstate(name: &str) -> Option<String> {
    fs::read_to_string(Path::new("/sys/class/net").join(name).join("operstate")).ok()
}

#[cfg(not(target_os = "linux"))]
fn interface_operstate(_name: &str) -> Option<String> {
    None
}

#[cfg(target_os = "windows")]
fn platform_thermal_zone(timeout: Duration) -> SourceResult<Option<ThermalReading>> {
    match windows_thermal_zone_wmic(timeout) {
        Ok(Some(v)) => Ok(Some(v)),
        Ok(None) | Err(_) => windows_thermal_zone_cim(timeout),
    }
}

#[cfg(target_os = "windows")]
fn windows_thermal_zone_wmic(timeout: Duration) -> SourceResult<Option<ThermalReading>> {
    const QUERY: &str = "wmic MSAcpi_ThermalZoneTemperature";
    let mut cmd = Command::new("wmic");
    cmd.args([
        "/namespace:\\\\root\\wmi",
        "PATH",
        "MSAcpi_ThermalZoneTemperature",
        "get",
        "CurrentTemperature",
        "/format:csv",
    ]);
    let text = run_with_timeout(QUERY, cmd, timeout)?.success_text(QUERY)?;

    // Node,CurrentTemperature
    Ok(text
        .lines()
        .filter_map(|line| line.split(',').nth(1))
        .filter_map(parse_f64_loose)
        .find(|raw| *raw > 0.0)
        .map(ThermalReading::DeciKelvin))
}

#[cfg(target_os = "windows")]
fn windows_thermal_zone_cim(timeout: Duration) -> SourceResult<Option<ThermalReading>> {
    const QUERY: &str = "Get-CimInstance MSAcpi_ThermalZoneTemperature";
    let script = "$t=Get-CimInstance -Namespace root/wmi -ClassName MSAcpi_ThermalZoneTemperature -ErrorAction SilentlyContinue; if ($null -ne $t) { $t | ForEach-Object { \"$($_.CurrentTemperature)\" } }";
    let text = run_powershell(QUERY, script, timeout)?.success_text(QUERY)?;
    Ok(text
        .lines()
        .filter_map(parse_f64_loose)
        .find(|raw| *raw > 0.0)
        .map(ThermalReading::DeciKelvin))
}

#[cfg(target_os = "linux")]
fn platform_thermal_zone(_timeout: Duration) -> SourceResult<Option<ThermalReading>> {
    let entries = fs::read_dir("/sys/class/thermal").map_err(|source| SourceError::Io {
        query: "/sys/class/thermal".to_string(),
        source,
    })?;

    let mut zones = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }

        let typ = fs::read_to_string(path.join("type"))
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let Ok(raw) = fs::read_to_string(path.join("temp")) else {
            continue;
        };
        let Ok(v) = raw.trim().parse::<f64>() else {
            continue;
        };
        let celsius = if v > 1000.0 { v / 1000.0 } else { v };
        if celsius > 0.0 {
            zones.push((typ, celsius));
        }
    }

    Ok(pick_cpu_zone(&zones).map(ThermalReading::Celsius))
}

/// A CPU package sensor wins, then the ACPI board zone. Anything else
/// (wifi, battery, nvme) is not a CPU temperature.
#[cfg(target_os = "linux")]
fn pick_cpu_zone(zones: &[(String, f64)]) -> Option<f64> {
    zones
        .iter()
        .find(|(typ, _)| CPU_SENSOR_MARKERS.iter().any(|m| typ.contains(m)))
        .or_else(|| zones.iter().find(|(typ, _)| typ == "acpitz"))
        .map(|(_, celsius)| *celsius)
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn platform_thermal_zone(_timeout: Duration) -> SourceResult<Option<ThermalReading>> {
    Ok(None)
}

fn collect_nvidia_smi(timeout: Duration) -> SourceResult<Vec<RawAdapter>> {
    const QUERY: &str = "nvidia-smi";
    let output = run_nvidia_smi(
        &[
            "--query-gpu=name,utilization.gpu,memory.used,memory.total,temperature.gpu",
            "--format=csv,noheader,nounits",
        ],
        timeout,
    )?;
    let text = output.success_text(QUERY)?;
    Ok(parse_nvidia_smi(&text))
}

fn parse_nvidia_smi(text: &str) -> Vec<RawAdapter> {
    const MIB: u64 = 1024 * 1024;
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 5 || parts[0].is_empty() {
                return None;
            }
            Some(RawAdapter {
                name: parts[0].to_string(),
                utilization_percent: parts[1].parse::<f64>().ok(),
                memory_used_bytes: parse_u64_loose(parts[2]).map(|v| v.saturating_mul(MIB)),
                memory_total_bytes: parse_u64_loose(parts[3])
                    .unwrap_or(0)
                    .saturating_mul(MIB),
                temperature_celsius: parts[4].parse::<f64>().ok(),
            })
        })
        .collect()
}

fn run_nvidia_smi(args: &[&str], timeout: Duration) -> SourceResult<CommandOutput> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.args(args);
    let first = run_with_timeout("nvidia-smi", cmd, timeout);

    #[cfg(target_os = "windows")]
    {
        if let Err(SourceError::Io { .. }) = first {
            let mut cmd = Command::new(r"C:\Windows\System32\nvidia-smi.exe");
            cmd.args(args);
            return run_with_timeout("nvidia-smi", cmd, timeout);
        }
    }

    first
}

#[cfg(target_os = "windows")]
fn collect_platform_adapters(timeout: Duration) -> SourceResult<Vec<RawAdapter>> {
    const QUERY: &str = "Get-CimInstance Win32_VideoController";
    let script = "$controllers=Get-CimInstance Win32_VideoController -ErrorAction SilentlyContinue; if(-not $controllers){return}; $eng=Get-CimInstance Win32_PerfFormattedData_GPUPerformanceCounters_GPUEngine -ErrorAction SilentlyContinue; $util=''; if($eng){ $util=($eng | Where-Object { $_.Name -like '*engtype_3D*' } | Measure-Object -Property UtilizationPercentage -Sum).Sum }; foreach($c in $controllers){ $total=0; if($c.AdapterRAM){$total=[double]$c.AdapterRAM}; \"$($c.Name)|${total}|${util}\" }";
    let text = run_powershell(QUERY, script, timeout)?.success_text(QUERY)?;

    Ok(text
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < 3 || parts[0].is_empty() {
                return None;
            }
            Some(RawAdapter {
                name: parts[0].to_string(),
                memory_total_bytes: parse_u64_loose(parts[1]).unwrap_or(0),
                memory_used_bytes: None,
                utilization_percent: parse_f64_loose(parts[2]),
                temperature_celsius: None,
            })
        })
        .collect())
}

#[cfg(target_os = "linux")]
fn collect_platform_adapters(_timeout: Duration) -> SourceResult<Vec<RawAdapter>> {
    let entries = fs::read_dir("/sys/class/drm").map_err(|source| SourceError::Io {
        query: "/sys/class/drm".to_string(),
        source,
    })?;

    let mut cards: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("card") && !n.contains('-'))
                .unwrap_or(false)
        })
        .collect();
    cards.sort();

    Ok(cards
        .iter()
        .filter_map(|card| drm_adapter(&card.join("device")))
        .collect())
}

#[cfg(target_os = "linux")]
fn drm_adapter(device: &Path) -> Option<RawAdapter> {
    let read = |name: &str| {
        fs::read_to_string(device.join(name))
            .ok()
            .map(|s| s.trim().to_string())
    };
    let vendor = read("vendor")?;
    let name = read("product_name")
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| drm_vendor_name(&vendor).to_string());
    let temperature_celsius = fs::read_dir(device.join("hwmon"))
        .ok()
        .and_then(|mut dirs| dirs.find_map(|d| d.ok()))
        .and_then(|d| fs::read_to_string(d.path().join("temp1_input")).ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|milli| milli / 1000.0);

    Some(RawAdapter {
        name,
        memory_total_bytes: read("mem_info_vram_total")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        memory_used_bytes: read("mem_info_vram_used").and_then(|v| v.parse().ok()),
        utilization_percent: read("gpu_busy_percent").and_then(|v| v.parse().ok()),
        temperature_celsius,
    })
}

#[cfg(target_os = "linux")]
fn drm_vendor_name(vendor: &str) -> &'static str {
    match vendor.to_lowercase().as_str() {
        "0x1002" => "AMD Radeon Graphics",
        "0x10de" => "NVIDIA Graphics",
        "0x8086" => "Intel Graphics",
        _ => "Unknown Display Adapter",
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn collect_platform_adapters(_timeout: Duration) -> SourceResult<Vec<RawAdapter>> {
    Ok(Vec::new())
}

#[cfg(target_os = "windows")]
fn run_powershell(query: &str, script: &str, timeout: Duration) -> SourceResult<CommandOutput> {
    let wrapped_script = format!(
        "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); $OutputEncoding=[System.Text.UTF8Encoding]::new($false); {script}"
    );
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-Command", &wrapped_script]);
    match run_with_timeout(query, cmd, timeout) {
        Err(SourceError::Io { .. }) => {
            let mut cmd =
                Command::new(r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe");
            cmd.args(["-NoProfile", "-Command", &wrapped_script]);
            run_with_timeout(query, cmd, timeout)
        }
        other => other,
    }
}
