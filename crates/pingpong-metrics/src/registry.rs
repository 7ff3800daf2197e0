use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use pingpong_common::error::{PingpongError, Result};
use tracing::{debug, info, warn};

use crate::{
    counter::CounterVec,
    format::exposition::{self, encode_sample, format_value},
    token::validate_token,
    types::{LabelSet, MetricFamily, MetricType, Sample, Schema},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub labels: LabelSet,
}

struct RegisteredFamily {
    descriptor: FamilyDescriptor,
    series: CounterVec,
}

/// Exposition lines recorded for one family during a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyReport {
    pub name: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub families: Vec<FamilyReport>,
    pub errors: Vec<PingpongError>,
}

impl IngestReport {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.families
            .iter()
            .flat_map(|family| family.lines.iter().map(String::as_str))
    }

    pub fn recorded(&self) -> usize {
        self.families.iter().map(|family| family.lines.len()).sum()
    }

    fn push_lines(&mut self, name: &str, lines: Vec<String>) {
        if !lines.is_empty() {
            self.families.push(FamilyReport {
                name: name.to_string(),
                lines,
            });
        }
    }
}

/// Process-wide set of dynamically registered counter families.
///
/// The outer lock guards the name map and is held only for lookups and
/// inserts; each family's series map has its own lock, and counter values
/// are updated without holding either.
pub struct MetricsRegistry {
    families: RwLock<HashMap<String, Arc<RegisteredFamily>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
        }
    }

    /// Registers unseen families and adds each sample's value to its counter.
    /// A new family's label set is fixed by its first sample that passes validation.
    pub fn create(&self, families: &[MetricFamily]) -> IngestReport {
        let mut report = IngestReport::default();
        for family in families {
            self.create_family(family, &mut report);
        }
        report
    }

    /// Adds exactly one to the counter of every sample of already known families.
    pub fn update(&self, families: &[MetricFamily]) -> IngestReport {
        let mut report = IngestReport::default();
        for family in families {
            self.update_family(family, &mut report);
        }
        report
    }

    /// Point-in-time copy of every family, ordered by name and label values.
    pub fn snapshot(&self) -> Result<Vec<MetricFamily>> {
        let entries: Vec<Arc<RegisteredFamily>> =
            self.families_read()?.values().cloned().collect();

        let mut snapshot = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut handles = entry.series.handles()?;
            handles.sort_by(|left, right| left.0.cmp(&right.0));

            let descriptor = &entry.descriptor;
            snapshot.push(MetricFamily {
                name: descriptor.name.clone(),
                help: descriptor.help.clone(),
                metric_type: descriptor.metric_type,
                samples: handles
                    .into_iter()
                    .map(|(values, counter)| {
                        Sample::new(descriptor.labels.materialize(&values), counter.get())
                    })
                    .collect(),
            });
        }

        snapshot.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(snapshot)
    }

    pub fn render_prometheus(&self) -> Result<String> {
        Ok(exposition::encode(&self.snapshot()?))
    }

    pub fn descriptor(&self, name: &str) -> Result<Option<FamilyDescriptor>> {
        Ok(self.lookup(name)?.map(|entry| entry.descriptor.clone()))
    }

    /// Current value of one series, if both the family and the series exist.
    pub fn value_of(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<Option<f64>> {
        let Some(entry) = self.lookup(name)? else {
            return Ok(None);
        };
        if entry.descriptor.labels != LabelSet::new(labels.keys().cloned()) {
            return Ok(None);
        }

        let values = entry.descriptor.labels.values_of(labels);
        Ok(entry.series.get(&values)?.map(|counter| counter.get()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.families_read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn create_family(&self, family: &MetricFamily, report: &mut IngestReport) {
        if let Err(err) = validate_token(&family.name) {
            warn!(metric = %family.name, "rejecting family with invalid name");
            report.errors.push(err);
            return;
        }

        let mut entry = match self.lookup(&family.name) {
            Ok(entry) => entry,
            Err(err) => {
                report.errors.push(err);
                return;
            }
        };
        let mut schema = match &entry {
            Some(existing) => Schema::Fixed(existing.descriptor.labels.clone()),
            None => Schema::Pending,
        };

        let mut lines = Vec::new();
        for sample in &family.samples {
            if let Err(err) = validate_sample(&family.name, sample) {
                warn!(metric = %family.name, error = %err, "skipping sample");
                report.errors.push(err);
                continue;
            }

            let labels = LabelSet::of_sample(sample);
            if let Err(expected) = schema.accept(&labels) {
                let err = label_mismatch(&family.name, expected, &labels);
                warn!(metric = %family.name, error = %err, "skipping sample");
                report.errors.push(err);
                continue;
            }

            let registered = match entry.clone() {
                Some(existing) => existing,
                None => match self.register(family, &labels) {
                    Ok(registered) => {
                        entry = Some(Arc::clone(&registered));
                        registered
                    }
                    Err(err) => {
                        report.errors.push(err);
                        continue;
                    }
                },
            };

            // Another request may have registered the name first.
            if registered.descriptor.labels != labels {
                let err = label_mismatch(&family.name, &registered.descriptor.labels, &labels);
                warn!(metric = %family.name, error = %err, "skipping sample");
                report.errors.push(err);
                schema = Schema::Fixed(registered.descriptor.labels.clone());
                continue;
            }

            let values = registered.descriptor.labels.values_of(&sample.labels);
            match registered.series.get_or_create(&values) {
                Ok(counter) => counter.inc_by(sample.value),
                Err(err) => {
                    report.errors.push(err);
                    continue;
                }
            }

            debug!(metric = %family.name, value = sample.value, "counter incremented");
            lines.push(encode_sample(&family.name, &sample.labels, sample.value, None));
        }

        if family.samples.is_empty() {
            debug!(metric = %family.name, "family has no samples, nothing registered");
        }
        report.push_lines(&family.name, lines);
    }

    fn update_family(&self, family: &MetricFamily, report: &mut IngestReport) {
        if let Err(err) = validate_token(&family.name) {
            report.errors.push(err);
            return;
        }

        let entry = match self.lookup(&family.name) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!(metric = %family.name, "update for unknown metric");
                report
                    .errors
                    .push(PingpongError::UnknownMetric(family.name.clone()));
                return;
            }
            Err(err) => {
                report.errors.push(err);
                return;
            }
        };

        let expected = &entry.descriptor.labels;
        let mut lines = Vec::new();
        for sample in &family.samples {
            let labels = LabelSet::of_sample(sample);
            if labels != *expected {
                let err = label_mismatch(&family.name, expected, &labels);
                warn!(metric = %family.name, error = %err, "skipping sample");
                report.errors.push(err);
                continue;
            }

            let counter = match entry.series.get_or_create(&expected.values_of(&sample.labels)) {
                Ok(counter) => counter,
                Err(err) => {
                    report.errors.push(err);
                    continue;
                }
            };
            counter.inc();

            lines.push(encode_sample(&family.name, &sample.labels, counter.get(), None));
        }

        report.push_lines(&family.name, lines);
    }

    fn lookup(&self, name: &str) -> Result<Option<Arc<RegisteredFamily>>> {
        Ok(self.families_read()?.get(name).cloned())
    }

    /// Inserts a new family unless a concurrent request already did, in which
    /// case the existing one is returned.
    fn register(&self, family: &MetricFamily, labels: &LabelSet) -> Result<Arc<RegisteredFamily>> {
        if !matches!(family.metric_type, MetricType::Counter | MetricType::Untyped) {
            debug!(
                metric = %family.name,
                declared = %family.metric_type,
                "registering as counter"
            );
        }

        let help = if family.help.is_empty() {
            format!("Custom Metric for {}", family.name)
        } else {
            family.help.clone()
        };

        let mut families = self.families_write()?;
        let entry = families.entry(family.name.clone()).or_insert_with(|| {
            info!(metric = %family.name, labels = %labels, "registered metric family");
            Arc::new(RegisteredFamily {
                descriptor: FamilyDescriptor {
                    name: family.name.clone(),
                    help,
                    metric_type: MetricType::Counter,
                    labels: labels.clone(),
                },
                series: CounterVec::new(),
            })
        });

        Ok(Arc::clone(entry))
    }

    fn families_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<RegisteredFamily>>>> {
        self.families
            .read()
            .map_err(|_| PingpongError::InternalError("metrics registry lock poisoned".to_string()))
    }

    fn families_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<RegisteredFamily>>>> {
        self.families
            .write()
            .map_err(|_| PingpongError::InternalError("metrics registry lock poisoned".to_string()))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_sample(metric: &str, sample: &Sample) -> Result<()> {
    for key in sample.labels.keys() {
        validate_token(key)?;
    }

    // Counters cannot go backwards.
    if !sample.value.is_finite() || sample.value < 0.0 {
        return Err(PingpongError::ValueParseError {
            metric: metric.to_string(),
            value: format_value(sample.value),
        });
    }

    Ok(())
}

fn label_mismatch(metric: &str, expected: &LabelSet, actual: &LabelSet) -> PingpongError {
    PingpongError::LabelSetMismatch {
        metric: metric.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
