//! The Sampler: populates the Snapshot Store with a fixed catalog of named
//! gauges on every poll tick.
//!
//! `runtime.MemStats`-shaped names (`Alloc`, `HeapAlloc`, `NumGC`, ...) are
//! carried over from the wire protocol this system shares with older
//! revisions, even though Rust has no garbage collector to report on. Where
//! `sysinfo` gives us a real analogue (resident/virtual process memory) we
//! report it; where it doesn't (GC pause counters), we report a stable zero
//! so the catalog, and any dashboard built against it, stays complete.

use metrics_model::MetricPoint;
use rand::Rng;
use sysinfo::{Pid, System};

pub struct Sampler {
    system: System,
    pid: Pid,
}

impl Sampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let pid = sysinfo::get_current_pid().unwrap_or(Pid::from(std::process::id() as usize));
        Self { system, pid }
    }

    /// Collects one round of gauges. Never returns an error: if a probe
    /// family fails (e.g. the process has already exited as far as the OS
    /// is concerned), that family is skipped and every other gauge still
    /// updates.
    pub fn collect(&mut self) -> Vec<MetricPoint> {
        let mut points = Vec::with_capacity(40);

        // CPU refresh window: sysinfo reports usage-since-last-refresh, so
        // this does not block on a sleep here. It must not happen while
        // holding the snapshot store's lock: the caller publishes the
        // returned points in a single later critical section.
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes(
            sysinfo::ProcessesToUpdate::Some(&[self.pid]),
            true,
        );

        self.push_process_gauges(&mut points);
        self.push_runtime_placeholder_gauges(&mut points);
        self.push_host_gauges(&mut points);

        points.push(MetricPoint::gauge(
            "RandomValue",
            rand::rng().random_range(0.0..100.0),
        ));

        points
    }

    fn push_process_gauges(&self, points: &mut Vec<MetricPoint>) {
        let Some(process) = self.system.process(self.pid) else {
            return;
        };
        let resident = process.memory() as f64;
        let virt = process.virtual_memory() as f64;

        // Physical/resident usage stands in for the Go heap-in-use family.
        for id in ["Alloc", "HeapAlloc", "HeapInuse", "HeapObjects"] {
            points.push(MetricPoint::gauge(id, resident));
        }
        // Virtual address space stands in for the broader "Sys" family.
        for id in ["Sys", "TotalAlloc", "HeapSys", "StackSys"] {
            points.push(MetricPoint::gauge(id, virt));
        }
    }

    fn push_runtime_placeholder_gauges(&self, points: &mut Vec<MetricPoint>) {
        // No GC exists in this runtime; these stay at a stable zero so the
        // catalog matches the wire protocol's field set exactly.
        for id in [
            "HeapIdle",
            "HeapReleased",
            "Frees",
            "Mallocs",
            "Lookups",
            "NextGC",
            "LastGC",
            "GCSys",
            "GCCPUFraction",
            "NumGC",
            "NumForcedGC",
            "PauseTotalNs",
            "StackInuse",
            "MCacheInuse",
            "MCacheSys",
            "MSpanInuse",
            "MSpanSys",
            "BuckHashSys",
            "OtherSys",
        ] {
            points.push(MetricPoint::gauge(id, 0.0));
        }
    }

    fn push_host_gauges(&self, points: &mut Vec<MetricPoint>) {
        points.push(MetricPoint::gauge(
            "TotalMemory",
            self.system.total_memory() as f64,
        ));
        points.push(MetricPoint::gauge(
            "FreeMemory",
            self.system.free_memory() as f64,
        ));

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(MetricPoint::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
