//! Static catalog of exported metrics.
//!
//! Cgroup metrics are described by the interface file (and key) they are read from.
//! See <https://docs.kernel.org/admin-guide/cgroup-v2.html> for the file formats.

use crate::procfs::MemoryMapping;

/// Label names of cgroup metrics.
pub const CGROUP_LABELS: [&str; 3] = ["namespace", "pod", "container"];

/// Label names of memory-mapping metrics.
pub const SMAPS_LABELS: [&str; 7] = [
    "namespace",
    "pod",
    "container",
    "host_pid",
    "ns_pid",
    "comm",
    "path",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Overwritten with the latest observation.
    Gauge,
    /// Monotonic; the kernel reports the cumulative value.
    Counter,
}

/// Binds a cgroup interface file (and optional key within it) to a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub file: &'static str,
    pub key: Option<&'static str>,
    pub kind: MetricKind,
}

const fn gauge(name: &'static str, help: &'static str, file: &'static str) -> MetricDefinition {
    MetricDefinition {
        name,
        help,
        file,
        key: None,
        kind: MetricKind::Gauge,
    }
}

const fn keyed(
    kind: MetricKind,
    name: &'static str,
    help: &'static str,
    file: &'static str,
    key: &'static str,
) -> MetricDefinition {
    MetricDefinition {
        name,
        help,
        file,
        key: Some(key),
        kind,
    }
}

use MetricKind::{Counter, Gauge};

pub const CGROUP_METRICS: [MetricDefinition; 30] = [
    // memory
    gauge(
        "cgroup_memory_current_bytes",
        "Total memory currently used by the cgroup and its descendants, in bytes (from memory.current).",
        "memory.current",
    ),
    gauge(
        "cgroup_memory_peak_bytes",
        "Maximum memory usage recorded for the cgroup and its descendants since creation or last reset (from memory.peak).",
        "memory.peak",
    ),
    gauge(
        "cgroup_memory_low_bytes",
        "Best-effort memory protection threshold below which memory is not reclaimed, -1 if unlimited (from memory.low).",
        "memory.low",
    ),
    gauge(
        "cgroup_memory_high_bytes",
        "Memory usage throttle limit above which processes are throttled and put under reclaim pressure, -1 if unlimited (from memory.high).",
        "memory.high",
    ),
    gauge(
        "cgroup_memory_max_bytes",
        "Hard memory usage limit of the cgroup, -1 if unlimited (from memory.max).",
        "memory.max",
    ),
    // memory.stat
    keyed(
        Gauge,
        "cgroup_memory_stat_anon_bytes",
        "Amount of memory used in anonymous mappings such as brk(), sbrk(), and mmap(MAP_ANONYMOUS) (from memory.stat:anon).",
        "memory.stat",
        "anon",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_file_bytes",
        "Amount of memory used to cache filesystem data, including tmpfs and shared memory (from memory.stat:file).",
        "memory.stat",
        "file",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_shmem_bytes",
        "Amount of cached filesystem data that is swap-backed, such as tmpfs, shm segments and shared anonymous mmap()s (from memory.stat:shmem).",
        "memory.stat",
        "shmem",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_kernel_bytes",
        "Total kernel memory usage, including kernel_stack, pagetables, percpu, vmalloc and slab (from memory.stat:kernel).",
        "memory.stat",
        "kernel",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_slab_bytes",
        "Amount of memory used for storing in-kernel data structures (from memory.stat:slab).",
        "memory.stat",
        "slab",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_slab_reclaimable_bytes",
        "Part of slab memory that might be reclaimed, such as dentries and inodes (from memory.stat:slab_reclaimable).",
        "memory.stat",
        "slab_reclaimable",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_slab_unreclaimable_bytes",
        "Part of slab memory that cannot be reclaimed on memory pressure (from memory.stat:slab_unreclaimable).",
        "memory.stat",
        "slab_unreclaimable",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_pagetables_bytes",
        "Amount of memory allocated for page tables (from memory.stat:pagetables).",
        "memory.stat",
        "pagetables",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_kernel_stack_bytes",
        "Amount of memory allocated to kernel stacks (from memory.stat:kernel_stack).",
        "memory.stat",
        "kernel_stack",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_active_anon_bytes",
        "Amount of active anonymous memory on the internal memory management lists (from memory.stat:active_anon).",
        "memory.stat",
        "active_anon",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_inactive_anon_bytes",
        "Amount of inactive anonymous memory on the internal memory management lists (from memory.stat:inactive_anon).",
        "memory.stat",
        "inactive_anon",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_active_file_bytes",
        "Amount of active file-backed memory on the internal memory management lists (from memory.stat:active_file).",
        "memory.stat",
        "active_file",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_inactive_file_bytes",
        "Amount of inactive file-backed memory on the internal memory management lists (from memory.stat:inactive_file).",
        "memory.stat",
        "inactive_file",
    ),
    keyed(
        Gauge,
        "cgroup_memory_stat_unevictable_bytes",
        "Amount of unevictable memory (from memory.stat:unevictable).",
        "memory.stat",
        "unevictable",
    ),
    keyed(
        Counter,
        "cgroup_memory_stat_pgfault_total",
        "Total number of page faults incurred by the cgroup (from memory.stat:pgfault).",
        "memory.stat",
        "pgfault",
    ),
    keyed(
        Counter,
        "cgroup_memory_stat_pgmajfault_total",
        "Number of major page faults incurred by the cgroup (from memory.stat:pgmajfault).",
        "memory.stat",
        "pgmajfault",
    ),
    // cpu.stat
    keyed(
        Counter,
        "cgroup_cpu_usage_usec",
        "Total CPU time consumed by all processes in the cgroup, in microseconds (from cpu.stat:usage_usec).",
        "cpu.stat",
        "usage_usec",
    ),
    keyed(
        Counter,
        "cgroup_cpu_user_usec",
        "Total user mode CPU time consumed by the cgroup, in microseconds (from cpu.stat:user_usec).",
        "cpu.stat",
        "user_usec",
    ),
    keyed(
        Counter,
        "cgroup_cpu_system_usec",
        "Total system (kernel) mode CPU time consumed by the cgroup, in microseconds (from cpu.stat:system_usec).",
        "cpu.stat",
        "system_usec",
    ),
    keyed(
        Counter,
        "cgroup_cpu_nr_periods_total",
        "Number of enforcement intervals (periods) for CPU bandwidth (from cpu.stat:nr_periods).",
        "cpu.stat",
        "nr_periods",
    ),
    keyed(
        Counter,
        "cgroup_cpu_nr_throttled_total",
        "Number of periods in which the cgroup was throttled due to CPU quota (from cpu.stat:nr_throttled).",
        "cpu.stat",
        "nr_throttled",
    ),
    keyed(
        Counter,
        "cgroup_cpu_throttled_usec_total",
        "Total time in microseconds that the cgroup was throttled due to CPU quota (from cpu.stat:throttled_usec).",
        "cpu.stat",
        "throttled_usec",
    ),
    // pids
    gauge(
        "cgroup_pids_current",
        "Number of processes currently in the cgroup and its descendants (from pids.current).",
        "pids.current",
    ),
    gauge(
        "cgroup_pids_max",
        "Hard limit on the number of processes allowed in the cgroup, -1 if unlimited (from pids.max).",
        "pids.max",
    ),
    gauge(
        "cgroup_pids_peak",
        "Maximum number of processes ever present in the cgroup and its descendants (from pids.peak).",
        "pids.peak",
    ),
];

/// A gauge fed from one field of an aggregated [`MemoryMapping`].
#[derive(Debug, Clone, Copy)]
pub struct SmapsMetricDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub value: fn(&MemoryMapping) -> u64,
}

const fn smaps(
    name: &'static str,
    help: &'static str,
    value: fn(&MemoryMapping) -> u64,
) -> SmapsMetricDefinition {
    SmapsMetricDefinition { name, help, value }
}

pub const SMAPS_METRICS: [SmapsMetricDefinition; 20] = [
    smaps(
        "process_smaps_size_bytes",
        "Total size of the memory mapping in bytes (from Size).",
        |m| m.size_bytes,
    ),
    smaps(
        "process_smaps_rss_bytes",
        "Resident Set Size: amount of the mapping currently resident in RAM in bytes (from Rss).",
        |m| m.rss_bytes,
    ),
    smaps(
        "process_smaps_pss_bytes",
        "Proportional Set Size: share of RAM of the mapping, divided by the number of processes sharing each page, in bytes (from Pss).",
        |m| m.pss_bytes,
    ),
    smaps(
        "process_smaps_pss_dirty_bytes",
        "Proportional Set Size of dirty pages in the mapping in bytes (from Pss_Dirty).",
        |m| m.pss_dirty_bytes,
    ),
    smaps(
        "process_smaps_shared_clean_bytes",
        "Amount of clean shared pages in the mapping in bytes (from Shared_Clean).",
        |m| m.shared_clean_bytes,
    ),
    smaps(
        "process_smaps_shared_dirty_bytes",
        "Amount of dirty shared pages in the mapping in bytes (from Shared_Dirty).",
        |m| m.shared_dirty_bytes,
    ),
    smaps(
        "process_smaps_private_clean_bytes",
        "Amount of clean private pages in the mapping in bytes (from Private_Clean).",
        |m| m.private_clean_bytes,
    ),
    smaps(
        "process_smaps_private_dirty_bytes",
        "Amount of dirty private pages in the mapping in bytes (from Private_Dirty).",
        |m| m.private_dirty_bytes,
    ),
    smaps(
        "process_smaps_referenced_bytes",
        "Amount of memory in the mapping currently marked as referenced or accessed in bytes (from Referenced).",
        |m| m.referenced_bytes,
    ),
    smaps(
        "process_smaps_anonymous_bytes",
        "Amount of memory in the mapping that does not belong to any file in bytes (from Anonymous).",
        |m| m.anonymous_bytes,
    ),
    smaps(
        "process_smaps_lazyfree_bytes",
        "Amount of memory in the mapping marked by madvise(MADV_FREE), freed under memory pressure, in bytes (from LazyFree).",
        |m| m.lazy_free_bytes,
    ),
    smaps(
        "process_smaps_anon_hugepages_bytes",
        "Amount of memory in the mapping backed by transparent hugepages in bytes (from AnonHugePages).",
        |m| m.anon_huge_pages_bytes,
    ),
    smaps(
        "process_smaps_shmem_pmdmapped_bytes",
        "Amount of shared (shmem/tmpfs) memory in the mapping backed by huge pages in bytes (from ShmemPmdMapped).",
        |m| m.shmem_pmd_mapped_bytes,
    ),
    smaps(
        "process_smaps_shared_hugetlb_bytes",
        "Amount of shared memory in the mapping backed by hugetlbfs pages in bytes (from Shared_Hugetlb).",
        |m| m.shared_hugetlb_bytes,
    ),
    smaps(
        "process_smaps_private_hugetlb_bytes",
        "Amount of private memory in the mapping backed by hugetlbfs pages in bytes (from Private_Hugetlb).",
        |m| m.private_hugetlb_bytes,
    ),
    smaps(
        "process_smaps_swap_bytes",
        "Amount of would-be-anonymous memory in the mapping that is swapped out in bytes (from Swap).",
        |m| m.swap_bytes,
    ),
    smaps(
        "process_smaps_swap_pss_bytes",
        "Proportional share of swap space used by the mapping in bytes (from SwapPss).",
        |m| m.swap_pss_bytes,
    ),
    smaps(
        "process_smaps_kernel_page_size_bytes",
        "Kernel page size used for the mapping in bytes (from KernelPageSize).",
        |m| m.kernel_page_size_bytes,
    ),
    smaps(
        "process_smaps_mmu_page_size_bytes",
        "MMU page size used for the mapping in bytes (from MMUPageSize).",
        |m| m.mmu_page_size_bytes,
    ),
    smaps(
        "process_smaps_locked_bytes",
        "Amount of memory in the mapping that is locked in RAM in bytes (from Locked).",
        |m| m.locked_bytes,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let names: HashSet<_> = CGROUP_METRICS
            .iter()
            .map(|d| d.name)
            .chain(SMAPS_METRICS.iter().map(|d| d.name))
            .collect();
        assert_eq!(names.len(), CGROUP_METRICS.len() + SMAPS_METRICS.len());
    }

    #[test]
    fn test_keyed_metrics_read_stat_files() {
        for definition in &CGROUP_METRICS {
            match definition.key {
                Some(_) => assert!(definition.file.ends_with(".stat"), "{}", definition.name),
                None => assert!(!definition.file.ends_with(".stat"), "{}", definition.name),
            }
        }
    }

    #[test]
    fn test_counters_are_cumulative_stat_fields() {
        let counters: Vec<_> = CGROUP_METRICS
            .iter()
            .filter(|d| d.kind == MetricKind::Counter)
            .filter_map(|d| d.key)
            .collect();
        assert_eq!(
            counters,
            vec![
                "pgfault",
                "pgmajfault",
                "usage_usec",
                "user_usec",
                "system_usec",
                "nr_periods",
                "nr_throttled",
                "throttled_usec"
            ]
        );
    }
}
