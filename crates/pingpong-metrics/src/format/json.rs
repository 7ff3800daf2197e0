use std::collections::BTreeMap;

use pingpong_common::error::{PingpongError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Decoded, exposition::format_value};
use crate::types::{MetricFamily, MetricType, Sample};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFamily {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "type")]
    pub metric_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<JsonSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSample {
    /// `null` and a missing key both mean "no labels".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// A missing value decodes as `""` and is rejected per sample.
    #[serde(default)]
    pub value: String,
}

pub fn decode(input: &[u8]) -> Result<Decoded> {
    let raw: Vec<JsonFamily> = serde_json::from_slice(input)
        .map_err(|err| PingpongError::MalformedInput(format!("invalid metrics json: {err}")))?;

    let mut errors = Vec::new();
    let families = raw
        .into_iter()
        .map(|family| convert_family(family, &mut errors))
        .collect();

    Ok(Decoded { families, errors })
}

fn convert_family(raw: JsonFamily, errors: &mut Vec<PingpongError>) -> MetricFamily {
    let metric_type = if raw.metric_type.is_empty() {
        MetricType::default()
    } else {
        raw.metric_type.parse().unwrap_or_else(|reason| {
            debug!(metric = %raw.name, %reason, "treating family as untyped");
            MetricType::Untyped
        })
    };

    let mut samples = Vec::with_capacity(raw.metrics.len());
    for metric in raw.metrics {
        let Ok(value) = metric.value.trim().parse::<f64>() else {
            warn!(
                metric = %raw.name,
                value = %metric.value,
                "dropping sample with unparseable value"
            );
            errors.push(PingpongError::ValueParseError {
                metric: raw.name.clone(),
                value: metric.value,
            });
            continue;
        };

        let timestamp_ms = match metric.timestamp_ms.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw_ts) => match raw_ts.parse::<i64>() {
                Ok(ts) => Some(ts),
                Err(_) => {
                    warn!(
                        metric = %raw.name,
                        timestamp = %raw_ts,
                        "dropping sample with unparseable timestamp"
                    );
                    errors.push(PingpongError::ValueParseError {
                        metric: raw.name.clone(),
                        value: raw_ts.to_string(),
                    });
                    continue;
                }
            },
        };

        samples.push(Sample {
            labels: metric.labels.unwrap_or_default(),
            value,
            timestamp_ms,
        });
    }

    MetricFamily {
        name: raw.name,
        help: raw.help,
        metric_type,
        samples,
    }
}

pub fn to_json_families(families: &[MetricFamily]) -> Vec<JsonFamily> {
    families
        .iter()
        .map(|family| JsonFamily {
            name: family.name.clone(),
            help: family.help.clone(),
            metric_type: family.metric_type.as_prometheus_type().to_string(),
            metrics: family
                .samples
                .iter()
                .map(|sample| JsonSample {
                    labels: (!sample.labels.is_empty()).then(|| sample.labels.clone()),
                    timestamp_ms: sample.timestamp_ms.map(|ts| ts.to_string()),
                    value: format_value(sample.value),
                })
                .collect(),
        })
        .collect()
}

pub fn encode(families: &[MetricFamily]) -> Result<String> {
    serde_json::to_string(&to_json_families(families)).map_err(|err| {
        PingpongError::InternalError(format!("failed to encode metrics json: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_families_and_samples() {
        let input = br#"[
            {
                "name": "requests_total",
                "help": "Requests",
                "type": "counter",
                "metrics": [
                    {"labels": {"path": "/a", "code": "200"}, "value": "5"},
                    {"labels": {"path": "/b", "code": "404"}, "value": "1.5", "timestamp_ms": "1700000000000"}
                ]
            }
        ]"#;

        let decoded = decode(input).unwrap();
        assert!(decoded.errors.is_empty());
        let family = &decoded.families[0];
        assert_eq!(family.name, "requests_total");
        assert_eq!(family.metric_type, MetricType::Counter);
        assert_eq!(family.samples[0].value, 5.0);
        assert_eq!(family.samples[1].timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn top_level_must_be_a_sequence() {
        let err = decode(br#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, PingpongError::MalformedInput(_)));
    }

    #[test]
    fn missing_name_rejects_the_payload() {
        let err = decode(br#"[{"help": "no name", "metrics": []}]"#).unwrap_err();
        assert!(matches!(err, PingpongError::MalformedInput(_)));
    }

    #[test]
    fn bad_value_drops_only_that_sample() {
        let input = br#"[{"name": "x", "metrics": [
            {"labels": {"a": "1"}, "value": "ten"},
            {"labels": {"a": "2"}, "value": "10"},
            {"labels": {"a": "3"}, "value": "1", "timestamp_ms": "yesterday"}
        ]}]"#;

        let decoded = decode(input).unwrap();
        assert_eq!(decoded.families[0].samples.len(), 1);
        assert_eq!(decoded.families[0].samples[0].labels["a"], "2");
        assert_eq!(decoded.errors.len(), 2);
        assert!(
            decoded
                .errors
                .iter()
                .all(|err| matches!(err, PingpongError::ValueParseError { .. }))
        );
    }

    #[test]
    fn missing_value_and_null_labels_stay_per_sample() {
        let input = br#"[{"name": "x", "metrics": [
            {"labels": {"a": "1"}},
            {"labels": {"a": "2"}, "value": "10"},
            {"labels": null, "value": "3"}
        ]}]"#;

        let decoded = decode(input).unwrap();
        let samples = &decoded.families[0].samples;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].labels["a"], "2");
        assert_eq!(samples[0].value, 10.0);
        assert!(samples[1].labels.is_empty());
        assert_eq!(samples[1].value, 3.0);
        assert!(matches!(
            decoded.errors.as_slice(),
            [PingpongError::ValueParseError { metric, value }] if metric == "x" && value.is_empty()
        ));
    }

    #[test]
    fn encode_matches_input_schema() {
        let family = MetricFamily {
            name: "jobs_total".to_string(),
            help: "Jobs".to_string(),
            metric_type: MetricType::Counter,
            samples: vec![Sample::new(
                BTreeMap::from([("queue".to_string(), "a".to_string())]),
                8.0,
            )],
        };

        let encoded = encode(std::slice::from_ref(&family)).unwrap();
        assert_eq!(
            encoded,
            r#"[{"name":"jobs_total","help":"Jobs","type":"counter","metrics":[{"labels":{"queue":"a"},"value":"8"}]}]"#
        );

        let decoded = decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded.families, vec![family]);
    }
}
