use tracing::info;

/// External transcodes are already multi-threaded; a couple of them at once
/// saturates most machines.
const MAX_AUTO_WORKERS: usize = 4;

/// Worker count used when the operator asks for `-c 0`.
pub fn auto_concurrency() -> usize {
    let cores = num_cpus::get().max(1);
    let workers = workers_for_cores(cores);
    info!(cores, workers, "auto-tuned concurrency");
    workers
}

fn workers_for_cores(cores: usize) -> usize {
    (cores / 2).clamp(1, MAX_AUTO_WORKERS)
}
