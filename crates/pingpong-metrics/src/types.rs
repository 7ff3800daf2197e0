use std::{collections::BTreeMap, collections::BTreeSet, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricType {
    #[default]
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        }
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "histogram" => Ok(Self::Histogram),
            "summary" => Ok(Self::Summary),
            "untyped" | "unknown" | "" => Ok(Self::Untyped),
            other => Err(format!("unknown metric type: {other}")),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_prometheus_type())
    }
}

/// Label names of a family, kept sorted so iteration order is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn of_sample(sample: &Sample) -> Self {
        Self::new(sample.labels.keys().cloned())
    }

    /// Projects a sample's labels onto this set in canonical order.
    ///
    /// The caller must already have checked that the sample's keys equal this set.
    pub fn values_of(&self, labels: &BTreeMap<String, String>) -> LabelValues {
        self.0
            .iter()
            .map(|name| labels.get(name).cloned().unwrap_or_default())
            .collect()
    }

    pub fn materialize(&self, values: &[String]) -> BTreeMap<String, String> {
        self.0
            .iter()
            .zip(values.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, name) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// Label values in the order of the owning family's [`LabelSet`].
pub type LabelValues = Vec<String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

impl Sample {
    pub fn new(labels: BTreeMap<String, String>, value: f64) -> Self {
        Self {
            labels,
            value,
            timestamp_ms: None,
        }
    }
}

/// Canonical family representation shared by every decoder and the registry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Label schema of a family while a batch is applied to it.
///
/// Starts `Pending` for names the registry has never seen and collapses to
/// `Fixed` on the first accepted sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    Pending,
    Fixed(LabelSet),
}

impl Schema {
    /// Accepts `labels` if compatible, fixing the schema when still pending.
    /// On mismatch returns the established label set.
    pub fn accept(&mut self, labels: &LabelSet) -> Result<(), &LabelSet> {
        match self {
            Self::Pending => {
                *self = Self::Fixed(labels.clone());
                Ok(())
            }
            Self::Fixed(expected) if expected == labels => Ok(()),
            Self::Fixed(expected) => Err(&*expected),
        }
    }
}
