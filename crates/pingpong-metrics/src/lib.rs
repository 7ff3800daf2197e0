//! Dynamic counter registry and the formats it is fed from and exported to.

pub mod counter;
pub mod format;
pub mod registry;
pub mod token;
pub mod types;

pub use format::{Decoded, InputFormat};
pub use registry::{FamilyDescriptor, FamilyReport, IngestReport, MetricsRegistry};
pub use types::{LabelSet, MetricFamily, MetricType, Sample, Schema};
