use chrono::Utc;
use sysinfo::{Disks, System};

use super::types::Stats;

const MB: u64 = 1024 * 1024;

/// Builds a snapshot from an already refreshed `System`.
pub fn get_stats(sysinfo: &System, task_count: u64) -> Stats {
    let disks = Disks::new_with_refreshed_list();
    let disk_total_bytes: u64 = disks.iter().map(|disk| disk.total_space()).sum();
    let disk_available: u64 = disks.iter().map(|disk| disk.available_space()).sum();
    let load = System::load_average();

    Stats {
        hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        system_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
        total_cpus: sysinfo.cpus().len() as u64,
        cpu_usage: (sysinfo.global_cpu_usage() * 100.0).round() / 100.0,
        load_one: load.one,
        load_five: load.five,
        load_fifteen: load.fifteen,
        total_memory_mb: sysinfo.total_memory() / MB,
        used_memory_mb: sysinfo.used_memory() / MB,
        available_memory_mb: sysinfo.available_memory() / MB,
        total_swap_mb: sysinfo.total_swap() / MB,
        used_swap_mb: sysinfo.used_swap() / MB,
        disk_total_bytes,
        disk_used_bytes: disk_total_bytes.saturating_sub(disk_available),
        task_count,
        collected_at: Some(Utc::now()),
    }
}

impl Stats {
    pub fn memory_used_percent(&self) -> f64 {
        if self.total_memory_mb == 0 {
            return 0.0;
        }
        self.used_memory_mb as f64 / self.total_memory_mb as f64 * 100.0
    }

    pub fn disk_used_percent(&self) -> f64 {
        if self.disk_total_bytes == 0 {
            return 0.0;
        }
        self.disk_used_bytes as f64 / self.disk_total_bytes as f64 * 100.0
    }
}
