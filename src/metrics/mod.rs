//! Prometheus registry holding every exported series.
//!
//! [`Metrics`] is created once at startup and shared between the collection task, which
//! writes, and the HTTP server, which encodes. It also tracks which label sets were
//! written in a pass so that series of exited containers and processes can be retired.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

mod definitions;
mod error;

pub use definitions::{
    CGROUP_LABELS, CGROUP_METRICS, MetricDefinition, MetricKind, SMAPS_LABELS, SMAPS_METRICS,
    SmapsMetricDefinition,
};
pub use error::{Error, Result};

use crate::container::ProcessInfo;
use crate::procfs::MemoryMapping;

#[derive(Debug, Clone)]
enum CgroupVec {
    Gauge(IntGaugeVec),
    Counter(IntCounterVec),
}

/// A registered cgroup metric.
#[derive(Debug, Clone)]
pub struct CgroupMetric {
    index: usize,
    definition: MetricDefinition,
    vec: CgroupVec,
}

impl CgroupMetric {
    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }
}

#[derive(Debug, Clone)]
struct SmapsMetric {
    definition: SmapsMetricDefinition,
    vec: IntGaugeVec,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Family {
    Cgroup(usize),
    Smaps(usize),
}

type SeriesKey = (Family, Vec<String>);

/// Label sets written in the previous and in the running pass.
#[derive(Debug, Default)]
struct Series {
    previous: HashSet<SeriesKey>,
    current: HashSet<SeriesKey>,
}

#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    cgroup: Vec<CgroupMetric>,
    smaps: Vec<SmapsMetric>,
    series: Mutex<Series>,
}

impl Metrics {
    /// Creates a registry with all cgroup and memory-mapping metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let mut cgroup = Vec::with_capacity(CGROUP_METRICS.len());
        for (index, definition) in CGROUP_METRICS.iter().enumerate() {
            let register_err = |source| Error::Register {
                name: definition.name,
                source,
            };
            let opts = Opts::new(definition.name, definition.help);
            let vec = match definition.kind {
                MetricKind::Gauge => {
                    let vec = IntGaugeVec::new(opts, &CGROUP_LABELS).map_err(register_err)?;
                    registry
                        .register(Box::new(vec.clone()))
                        .map_err(register_err)?;
                    CgroupVec::Gauge(vec)
                }
                MetricKind::Counter => {
                    let vec = IntCounterVec::new(opts, &CGROUP_LABELS).map_err(register_err)?;
                    registry
                        .register(Box::new(vec.clone()))
                        .map_err(register_err)?;
                    CgroupVec::Counter(vec)
                }
            };
            cgroup.push(CgroupMetric {
                index,
                definition: *definition,
                vec,
            });
        }

        let mut smaps = Vec::with_capacity(SMAPS_METRICS.len());
        for definition in &SMAPS_METRICS {
            let register_err = |source| Error::Register {
                name: definition.name,
                source,
            };
            let vec = IntGaugeVec::new(Opts::new(definition.name, definition.help), &SMAPS_LABELS)
                .map_err(register_err)?;
            registry
                .register(Box::new(vec.clone()))
                .map_err(register_err)?;
            smaps.push(SmapsMetric {
                definition: *definition,
                vec,
            });
        }

        log::debug!(
            "Registered {} cgroup and {} memory-mapping metrics",
            cgroup.len(),
            smaps.len()
        );

        Ok(Self {
            registry,
            cgroup,
            smaps,
            series: Mutex::new(Series::default()),
        })
    }

    pub fn cgroup_metrics(&self) -> &[CgroupMetric] {
        &self.cgroup
    }

    /// Records one observation of a cgroup metric.
    ///
    /// Gauges are overwritten. Counters receive the cumulative value reported by the
    /// kernel: only the increase since the last observation is added, and a decrease is
    /// treated as a reset of the underlying counter. Negative values are ignored for
    /// counters.
    pub fn record_cgroup(&self, metric: &CgroupMetric, labels: [&str; 3], value: i64) {
        match &metric.vec {
            CgroupVec::Gauge(vec) => vec.with_label_values(&labels).set(value),
            CgroupVec::Counter(vec) => {
                let Ok(observed) = u64::try_from(value) else {
                    log::debug!(
                        "Ignoring negative value {} for counter {}",
                        value,
                        metric.definition.name
                    );
                    return;
                };
                apply_cumulative(vec, &labels, observed);
            }
        }
        self.mark(Family::Cgroup(metric.index), &labels);
    }

    /// Records the memory mappings of one process, aggregated per backing path.
    pub fn record_process_mappings(
        &self,
        container_labels: [&str; 3],
        process: &ProcessInfo,
        mappings: &[MemoryMapping],
    ) {
        let host_pid = process.host_pid.to_string();
        let ns_pid = process.ns_pid.to_string();
        let [namespace, pod, container] = container_labels;

        for mapping in aggregate_by_path(mappings).values() {
            let labels = [
                namespace,
                pod,
                container,
                host_pid.as_str(),
                ns_pid.as_str(),
                process.comm.as_str(),
                mapping.path.as_str(),
            ];
            for (index, metric) in self.smaps.iter().enumerate() {
                let value = (metric.definition.value)(mapping);
                metric
                    .vec
                    .with_label_values(&labels)
                    .set(i64::try_from(value).unwrap_or(i64::MAX));
                self.mark(Family::Smaps(index), &labels);
            }
        }
    }

    /// Ends a collection pass: removes every series written in the previous pass but
    /// not in this one.
    pub fn finish_pass(&self) {
        let mut series = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let Series { previous, current } = &mut *series;

        let mut retired = 0usize;
        for (family, labels) in previous.difference(current) {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            // the series may already be gone after a counter reset
            let _ = match family {
                Family::Cgroup(index) => match &self.cgroup[*index].vec {
                    CgroupVec::Gauge(vec) => vec.remove_label_values(labels.as_slice()),
                    CgroupVec::Counter(vec) => vec.remove_label_values(labels.as_slice()),
                },
                Family::Smaps(index) => self.smaps[*index].vec.remove_label_values(labels.as_slice()),
            };
            retired += 1;
        }
        if retired > 0 {
            log::debug!("Retired {} stale series", retired);
        }

        *previous = std::mem::take(current);
    }

    /// Encodes all series in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(Error::Encode)
    }

    fn mark(&self, family: Family, labels: &[&str]) {
        let key = (family, labels.iter().map(|l| (*l).to_owned()).collect());
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .insert(key);
    }

    /// Returns the value of the series `name` whose labels include all of `labels`.
    #[cfg(test)]
    pub(crate) fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let text = self.encode().ok()?;
        let prefix = format!("{name}{{");
        text.lines()
            .filter(|line| line.starts_with(&prefix))
            .find(|line| {
                labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }
}

/// Adds the increase of a cumulative kernel counter to a Prometheus counter.
fn apply_cumulative(vec: &IntCounterVec, labels: &[&str], observed: u64) {
    let counter = vec.with_label_values(labels);
    let current = counter.get();
    if observed >= current {
        counter.inc_by(observed - current);
    } else {
        // counter went backwards: cgroup was recreated under the same labels
        let _ = vec.remove_label_values(labels);
        vec.with_label_values(labels).inc_by(observed);
    }
}

/// Merges mappings with the same backing path. Sizes are summed, page sizes keep the
/// maximum.
fn aggregate_by_path(mappings: &[MemoryMapping]) -> BTreeMap<&str, MemoryMapping> {
    let mut by_path: BTreeMap<&str, MemoryMapping> = BTreeMap::new();
    for mapping in mappings {
        match by_path.get_mut(mapping.path.as_str()) {
            Some(merged) => merged.merge(mapping),
            None => {
                by_path.insert(mapping.path.as_str(), mapping.clone());
            }
        }
    }
    by_path
}
