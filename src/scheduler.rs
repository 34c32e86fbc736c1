//! Timer-driven collection passes.
//!
//! A pass fetches the container inventory, attributes processes to containers, reads
//! the cgroup files of every container and the memory maps of every attributed process,
//! and writes the results to [`Metrics`]. Passes never overlap: ticks that arrive while a
//! pass is running are dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cgroup;
use crate::config::Filters;
use crate::container::{Container, DiscoveredContainer, ProcessInfo};
use crate::correlator::correlate_processes;
use crate::error::ResultOkLogExt;
use crate::inventory::Inventory;
use crate::metrics::Metrics;
use crate::procfs::{MemoryMapping, ProcFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Collecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Cancellation was requested before any metric was written.
    Cancelled,
    /// The inventory could not be fetched; retried on the next tick.
    InventoryFailed,
    /// No container passed the filters; metrics were left untouched.
    NoContainers,
    /// The filesystem phase did not complete.
    Aborted,
    Collected(PassSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    pub containers: usize,
    pub cgroups: usize,
    pub processes: usize,
}

/// Everything the filesystem phase of a pass needs. Shared with the blocking worker.
#[derive(Debug)]
pub struct CollectionContext {
    cgroup_root: PathBuf,
    procfs: ProcFs,
    filters: Filters,
    metrics: Arc<Metrics>,
}

impl CollectionContext {
    pub fn new(
        cgroup_root: impl Into<PathBuf>,
        procfs: ProcFs,
        filters: Filters,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            procfs,
            filters,
            metrics,
        }
    }

    /// Runs the filesystem phase of a pass. Blocks on file I/O.
    pub fn collect(&self, discovered: Vec<DiscoveredContainer>) -> PassSummary {
        let mut containers: Vec<Container> = discovered
            .into_iter()
            .filter_map(|container| {
                let Some(pattern) = self.filters.command_pattern(
                    &container.namespace,
                    &container.pod,
                    &container.container,
                ) else {
                    log::debug!("Container {} not selected by any filter", container.id);
                    return None;
                };
                let pattern = pattern.to_owned();
                Some(Container::new(container, pattern))
            })
            .collect();

        correlate_processes(&self.procfs, &mut containers);

        let mut summary = PassSummary {
            containers: containers.len(),
            ..Default::default()
        };
        for container in &containers {
            if self.collect_cgroup(container) {
                summary.cgroups += 1;
            }
            for process in container.processes() {
                if self.collect_mappings(container, process) {
                    summary.processes += 1;
                }
            }
        }
        self.metrics.finish_pass();

        summary
    }

    fn collect_cgroup(&self, container: &Container) -> bool {
        let handle = match cgroup::find_scope(&self.cgroup_root, container.id().as_str()) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("Skipping cgroup metrics of {}: {}", container, err);
                return false;
            }
        };
        log::trace!("Reading cgroup {} for {}", handle.path().display(), container);

        for metric in self.metrics.cgroup_metrics() {
            let definition = metric.definition();
            if let Some(value) = handle
                .read_value(definition.file, definition.key)
                .ok_log(log::Level::Debug)
            {
                self.metrics.record_cgroup(metric, container.labels(), value);
            }
        }

        true
    }

    fn collect_mappings(&self, container: &Container, process: &ProcessInfo) -> bool {
        let Some(reader) = self.procfs.smaps(process.host_pid).ok_log(log::Level::Debug) else {
            return false;
        };
        let mappings = match reader.collect::<std::io::Result<Vec<MemoryMapping>>>() {
            Ok(mappings) => mappings,
            Err(err) => {
                log::debug!(
                    "Skipping memory maps of process {} in {}: {}",
                    process.host_pid,
                    container,
                    err
                );
                return false;
            }
        };

        self.metrics
            .record_process_mappings(container.labels(), process, &mappings);
        true
    }
}

/// Drives collection passes on a fixed interval.
#[derive(Debug)]
pub struct Scheduler<I> {
    inventory: I,
    context: Arc<CollectionContext>,
    interval: Duration,
    state: State,
}

impl<I: Inventory> Scheduler<I> {
    pub fn new(inventory: I, context: CollectionContext, interval: Duration) -> Self {
        Self {
            inventory,
            context: Arc::new(context),
            interval,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs passes until `token` is cancelled. The first pass starts immediately.
    pub async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("Collecting every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.run_pass(&token).await == PassOutcome::Cancelled {
                break;
            }
        }

        log::info!("Collection stopped");
    }

    /// Runs exactly one pass.
    pub async fn run_pass(&mut self, token: &CancellationToken) -> PassOutcome {
        self.state = State::Collecting;
        let outcome = self.collect(token).await;
        self.state = State::Idle;

        match outcome {
            PassOutcome::Collected(summary) => log::debug!(
                "Pass finished: {} containers, {} cgroups, {} processes",
                summary.containers,
                summary.cgroups,
                summary.processes
            ),
            other => log::debug!("Pass ended: {:?}", other),
        }
        outcome
    }

    async fn collect(&self, token: &CancellationToken) -> PassOutcome {
        let discovered = tokio::select! {
            biased;
            _ = token.cancelled() => return PassOutcome::Cancelled,
            result = self.inventory.discover_containers() => result,
        };
        let discovered = match discovered {
            Ok(discovered) => discovered,
            Err(err) => {
                log::error!("Failed to discover containers: {}", err);
                return PassOutcome::InventoryFailed;
            }
        };
        if discovered.is_empty() {
            log::warn!("No running containers match the configured filters");
            return PassOutcome::NoContainers;
        }

        let context = Arc::clone(&self.context);
        match tokio::task::spawn_blocking(move || context.collect(discovered)).await {
            Ok(summary) => PassOutcome::Collected(summary),
            Err(err) => {
                log::error!("Collection worker failed: {}", err);
                PassOutcome::Aborted
            }
        }
    }
}
