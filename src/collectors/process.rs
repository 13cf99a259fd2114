use crate::collectors::{RawProcess, SourceResult};
use crate::snapshot::{clamp_percent, round1, ProcessSample, Sampled, TopProcess, BYTES_PER_MB};

pub fn fallback_sample() -> ProcessSample {
    ProcessSample {
        total: 247,
        responding: 247,
        top: Vec::new(),
    }
}

/// Ranks by CPU share normalised to the whole machine, so a process that
/// saturates every core reads 100.
pub fn sample(
    processes: SourceResult<Vec<RawProcess>>,
    top_n: usize,
    logical_cores: usize,
) -> Sampled<ProcessSample> {
    let processes = match processes {
        Ok(list) => list,
        Err(err) => return Sampled::fallback(fallback_sample(), err),
    };

    let total = processes.len();
    let responding = processes.iter().filter(|p| p.responding).count();
    let cores = logical_cores.max(1) as f64;

    let mut ranked: Vec<TopProcess> = processes
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .map(|p| TopProcess {
            name: p.name,
            pid: p.pid,
            cpu_percent: clamp_percent(round1(p.cpu_percent / cores)),
            memory_mb: round1(p.memory_bytes as f64 / BYTES_PER_MB),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then_with(|| b.memory_mb.total_cmp(&a.memory_mb))
            .then_with(|| a.pid.cmp(&b.pid))
    });
    ranked.truncate(top_n);

    Sampled::live(ProcessSample {
        total,
        responding,
        top: ranked,
    })
}
