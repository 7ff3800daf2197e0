use std::collections::BTreeMap;

use crate::types::MetricFamily;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders families in the text exposition format, separated by blank lines.
pub fn encode(families: &[MetricFamily]) -> String {
    families
        .iter()
        .map(encode_family)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn encode_family(family: &MetricFamily) -> String {
    let mut output = String::new();

    if !family.help.is_empty() {
        output.push_str("# HELP ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(&escape_help(&family.help));
        output.push('\n');
    }

    output.push_str("# TYPE ");
    output.push_str(&family.name);
    output.push(' ');
    output.push_str(family.metric_type.as_prometheus_type());
    output.push('\n');

    for sample in &family.samples {
        output.push_str(&encode_sample(
            &family.name,
            &sample.labels,
            sample.value,
            sample.timestamp_ms,
        ));
    }

    output
}

/// One sample line. Label pairs come out sorted by key because `labels` is
/// a `BTreeMap`; the `{}` block is omitted when there are no labels.
pub fn encode_sample(
    name: &str,
    labels: &BTreeMap<String, String>,
    value: f64,
    timestamp_ms: Option<i64>,
) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_value(value));

    if let Some(ts) = timestamp_ms {
        rendered.push(' ');
        rendered.push_str(&ts.to_string());
    }

    rendered.push('\n');
    rendered
}

pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "+" } else { "-" };
        format!("{sign}Inf")
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricType, Sample};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn sorts_label_pairs_by_key() {
        let line = encode_sample(
            "requests_total",
            &labels(&[("path", "/a"), ("code", "200")]),
            1.0,
            None,
        );
        assert_eq!(line, "requests_total{code=\"200\",path=\"/a\"} 1\n");
    }

    #[test]
    fn omits_braces_without_labels() {
        assert_eq!(encode_sample("up", &BTreeMap::new(), 0.5, Some(17)), "up 0.5 17\n");
    }

    #[test]
    fn escapes_label_values_and_help() {
        let family = MetricFamily {
            name: "odd".to_string(),
            help: "line one\nback\\slash".to_string(),
            metric_type: MetricType::Counter,
            samples: vec![Sample::new(labels(&[("q", "say \"hi\"\\")]), 2.0)],
        };
        assert_eq!(
            encode_family(&family),
            "# HELP odd line one\\nback\\\\slash\n\
             # TYPE odd counter\n\
             odd{q=\"say \\\"hi\\\"\\\\\"} 2\n"
        );
    }

    #[test]
    fn formats_special_values() {
        assert_eq!(format_value(8.0), "8");
        assert_eq!(format_value(0.25), "0.25");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
    }

    #[test]
    fn encoding_is_byte_identical_across_calls() {
        let family = MetricFamily {
            name: "jobs_total".to_string(),
            help: "Jobs".to_string(),
            metric_type: MetricType::Counter,
            samples: vec![
                Sample::new(labels(&[("queue", "a"), ("state", "ok")]), 3.0),
                Sample::new(labels(&[("state", "err"), ("queue", "b")]), 1.0),
            ],
        };
        assert_eq!(encode(&[family.clone()]), encode(&[family]));
    }
}
