//! Host description gathered through `sysinfo`.

use std::env;
use std::fs;
use std::thread;

use sysinfo::System;

use super::{Battery, SystemInfo};

const POWER_SUPPLY_GLOB: &str = "/sys/class/power_supply/BAT*/capacity";

/// Takes a snapshot of the host.
///
/// CPU usage needs two samples; this blocks for sysinfo's minimum update
/// interval between them.
pub(super) fn snapshot() -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_usage();
    thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu_usage();

    let mut problems = Vec::new();

    let hostname = System::host_name().unwrap_or_else(|| {
        problems.push("hostname unavailable");
        String::new()
    });
    let processor = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_default();

    let total = system.total_memory();
    let memory_percent = if total == 0 {
        problems.push("memory totals unavailable");
        0.0
    } else {
        (system.used_memory() as f64 / total as f64 * 100.0) as f32
    };

    SystemInfo {
        hostname,
        platform: System::name().unwrap_or_else(|| env::consts::OS.to_string()),
        platform_release: System::kernel_version().unwrap_or_default(),
        platform_version: System::os_version().unwrap_or_default(),
        architecture: env::consts::ARCH.to_string(),
        processor,
        cpu_percent: system.global_cpu_usage(),
        memory_percent,
        battery: battery_level(),
        error: if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        },
    }
}

fn battery_level() -> Battery {
    let Ok(paths) = glob::glob(POWER_SUPPLY_GLOB) else {
        return Battery::UNAVAILABLE;
    };
    paths
        .filter_map(Result::ok)
        .find_map(|path| fs::read_to_string(path).ok())
        .and_then(|raw| parse_capacity(&raw))
        .map_or(Battery::UNAVAILABLE, Battery::Percent)
}

fn parse_capacity(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| (0.0..=100.0).contains(value))
}
