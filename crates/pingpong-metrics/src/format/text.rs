//! Decoder for the line-oriented text exposition format.
//!
//! `# HELP` and `# TYPE` comments attach metadata to a family whether they
//! appear before or after its first sample. Lines that cannot be parsed are
//! skipped and reported; only a payload with no usable sample line at all is
//! rejected outright.

use std::collections::{BTreeMap, HashMap};

use pingpong_common::error::{PingpongError, Result};
use tracing::warn;

use super::Decoded;
use crate::types::{MetricFamily, MetricType, Sample};

pub fn decode(input: &str) -> Result<Decoded> {
    let mut builder = FamilyBuilder::default();
    let mut errors = Vec::new();
    let mut sample_lines = 0_usize;
    let mut failed_lines = 0_usize;

    for (index, raw_line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            match parse_comment(comment) {
                Ok(Comment::Help { name, help }) => builder.set_help(name, help),
                Ok(Comment::Type { name, metric_type }) => builder.set_type(name, metric_type),
                Ok(Comment::Other) => {}
                Err(reason) => {
                    warn!(line = line_number, %reason, "skipping malformed comment line");
                    errors.push(PingpongError::MalformedInput(format!(
                        "line {line_number}: {reason}"
                    )));
                }
            }
            continue;
        }

        match parse_sample_line(line) {
            Ok(parsed) => {
                sample_lines += 1;
                builder.push(parsed.name, parsed.sample);
            }
            Err(err) => {
                failed_lines += 1;
                warn!(line = line_number, error = %err, "skipping malformed sample line");
                errors.push(match err {
                    LineError::Syntax(reason) => {
                        PingpongError::MalformedInput(format!("line {line_number}: {reason}"))
                    }
                    LineError::Value { metric, value } => {
                        PingpongError::ValueParseError { metric, value }
                    }
                });
            }
        }
    }

    if sample_lines == 0 && failed_lines > 0 {
        return Err(PingpongError::MalformedInput(format!(
            "none of {failed_lines} sample lines could be parsed"
        )));
    }

    Ok(Decoded {
        families: builder.finish(),
        errors,
    })
}

#[derive(Default)]
struct Metadata {
    help: Option<String>,
    metric_type: Option<MetricType>,
}

#[derive(Default)]
struct FamilyBuilder {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
    pending: HashMap<String, Metadata>,
}

impl FamilyBuilder {
    fn set_help(&mut self, name: &str, help: String) {
        match self.index.get(name) {
            Some(&position) => self.families[position].help = help,
            None => {
                self.pending.entry(name.to_string()).or_default().help = Some(help);
            }
        }
    }

    fn set_type(&mut self, name: &str, metric_type: MetricType) {
        match self.index.get(name) {
            Some(&position) => self.families[position].metric_type = metric_type,
            None => {
                self.pending.entry(name.to_string()).or_default().metric_type = Some(metric_type);
            }
        }
    }

    fn push(&mut self, name: String, sample: Sample) {
        let position = match self.index.get(&name) {
            Some(&position) => position,
            None => {
                let metadata = self.pending.remove(&name).unwrap_or_default();
                self.families.push(MetricFamily {
                    name: name.clone(),
                    help: metadata.help.unwrap_or_default(),
                    metric_type: metadata.metric_type.unwrap_or_default(),
                    samples: Vec::new(),
                });
                self.index.insert(name, self.families.len() - 1);
                self.families.len() - 1
            }
        };

        self.families[position].samples.push(sample);
    }

    fn finish(self) -> Vec<MetricFamily> {
        self.families
    }
}

enum Comment<'a> {
    Help { name: &'a str, help: String },
    Type { name: &'a str, metric_type: MetricType },
    Other,
}

fn parse_comment(body: &str) -> std::result::Result<Comment<'_>, String> {
    let body = body.trim_start();
    let (keyword, rest) = split_token(body);

    match keyword {
        "HELP" => {
            let (name, help) = split_token(rest);
            if name.is_empty() {
                return Err("HELP without metric name".to_string());
            }
            Ok(Comment::Help {
                name,
                help: unescape_help(help),
            })
        }
        "TYPE" => {
            let (name, type_name) = split_token(rest);
            if name.is_empty() {
                return Err("TYPE without metric name".to_string());
            }
            let metric_type = type_name
                .parse::<MetricType>()
                .map_err(|reason| format!("{reason} for {name}"))?;
            Ok(Comment::Type { name, metric_type })
        }
        _ => Ok(Comment::Other),
    }
}

/// Splits off the first whitespace-delimited token; the remainder keeps
/// its inner spacing.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim()),
        None => (input, ""),
    }
}

struct ParsedLine {
    name: String,
    sample: Sample,
}

#[derive(Debug)]
enum LineError {
    Syntax(String),
    Value { metric: String, value: String },
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(reason) => f.write_str(reason),
            Self::Value { metric, value } => write!(f, "invalid value {value:?} for {metric}"),
        }
    }
}

fn parse_sample_line(line: &str) -> std::result::Result<ParsedLine, LineError> {
    let name_end = line
        .find(|ch: char| ch == '{' || ch.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return Err(LineError::Syntax("missing metric name".to_string()));
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(after_brace).map_err(LineError::Syntax)?;
        labels = parsed;
        rest = remaining;
    }

    let mut fields = rest.split_whitespace();
    let Some(raw_value) = fields.next() else {
        return Err(LineError::Syntax(format!("missing value for {name}")));
    };
    let raw_timestamp = fields.next();
    if fields.next().is_some() {
        return Err(LineError::Syntax(format!("unexpected trailing data for {name}")));
    }

    let value = parse_value(raw_value).ok_or_else(|| LineError::Value {
        metric: name.to_string(),
        value: raw_value.to_string(),
    })?;
    let timestamp_ms = raw_timestamp
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| LineError::Value {
                metric: name.to_string(),
                value: raw.to_string(),
            })
        })
        .transpose()?;

    Ok(ParsedLine {
        name: name.to_string(),
        sample: Sample {
            labels,
            value,
            timestamp_ms,
        },
    })
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse::<f64>().ok(),
    }
}

/// Parses `key="value",...}` and returns the labels plus whatever follows
/// the closing brace.
fn parse_labels(input: &str) -> std::result::Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }
        if rest.is_empty() {
            return Err("unterminated label set".to_string());
        }

        let key_end = rest
            .find(|ch: char| ch == '=' || ch == ',' || ch == '}' || ch.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        if key.is_empty() {
            return Err("empty label name".to_string());
        }

        rest = rest[key_end..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| format!("expected '=' after label {key}"))?
            .trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| format!("label {key} value must be double-quoted"))?;

        let (value, after_value) = parse_quoted(rest)?;
        if labels.insert(key.to_string(), value).is_some() {
            return Err(format!("duplicate label {key}"));
        }

        rest = after_value.trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else if !rest.starts_with('}') {
            return Err(format!("expected ',' or '}}' after label {key}"));
        }
    }
}

fn parse_quoted(input: &str) -> std::result::Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => return Ok((value, &input[index + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            _ => value.push(ch),
        }
    }

    Err("unterminated label value".to_string())
}

fn unescape_help(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => output.push('\\'),
            Some('n') => output.push('\n'),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::exposition;

    #[test]
    fn decodes_labelled_sample() {
        let decoded = decode("requests_total{path=\"/a\",code=\"200\"} 1\n").unwrap();
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.families.len(), 1);

        let family = &decoded.families[0];
        assert_eq!(family.name, "requests_total");
        assert_eq!(family.samples.len(), 1);
        assert_eq!(family.samples[0].labels["path"], "/a");
        assert_eq!(family.samples[0].labels["code"], "200");
        assert_eq!(family.samples[0].value, 1.0);

        assert_eq!(
            exposition::encode_sample(
                &family.name,
                &family.samples[0].labels,
                family.samples[0].value,
                None
            ),
            "requests_total{code=\"200\",path=\"/a\"} 1\n"
        );
    }

    #[test]
    fn metadata_before_and_after_samples() {
        let input = "\
# HELP jobs_total Jobs processed.
# TYPE jobs_total counter
jobs_total{queue=\"a\"} 3
queue_depth 4 1700000000000
# HELP queue_depth Items waiting.
# TYPE queue_depth gauge
";
        let decoded = decode(input).unwrap();
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.families.len(), 2);

        assert_eq!(decoded.families[0].help, "Jobs processed.");
        assert_eq!(decoded.families[0].metric_type, MetricType::Counter);

        let depth = &decoded.families[1];
        assert_eq!(depth.help, "Items waiting.");
        assert_eq!(depth.metric_type, MetricType::Gauge);
        assert!(depth.samples[0].labels.is_empty());
        assert_eq!(depth.samples[0].timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn unescapes_label_values_and_help() {
        let input = "# HELP odd A \\\\ and\\nmore\nodd{q=\"say \\\"hi\\\"\",p=\"a\\\\b\",} 2\n";
        let decoded = decode(input).unwrap();
        let family = &decoded.families[0];
        assert_eq!(family.help, "A \\ and\nmore");
        assert_eq!(family.samples[0].labels["q"], "say \"hi\"");
        assert_eq!(family.samples[0].labels["p"], "a\\b");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = "\
good_total 1
bad_total{a=\"1\" 2
worse_total{a=1} 3
value_total abc
also_good{x=\"y\"} 2
";
        let decoded = decode(input).unwrap();
        let names: Vec<_> = decoded.families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["good_total", "also_good"]);
        assert_eq!(decoded.errors.len(), 3);
        assert!(matches!(
            decoded.errors[2],
            PingpongError::ValueParseError { ref metric, .. } if metric == "value_total"
        ));
    }

    #[test]
    fn rejects_payload_without_any_valid_sample() {
        let err = decode("this is not metrics\nnor is this\n").unwrap_err();
        assert!(matches!(err, PingpongError::MalformedInput(_)));
    }

    #[test]
    fn comments_only_payload_is_empty_not_malformed() {
        let decoded = decode("# HELP lonely nobody\n# just a note\n\n").unwrap();
        assert!(decoded.families.is_empty());
        assert!(decoded.errors.is_empty());
    }

    #[test]
    fn repeated_names_merge_into_one_family() {
        let decoded = decode("a{k=\"1\"} 1\nb 2\na{k=\"2\"} 3\n").unwrap();
        assert_eq!(decoded.families.len(), 2);
        assert_eq!(decoded.families[0].samples.len(), 2);
    }

    #[test]
    fn special_float_values() {
        let decoded = decode("x +Inf\ny NaN\nz -1.5e3\n").unwrap();
        assert!(decoded.families[0].samples[0].value.is_infinite());
        assert!(decoded.families[1].samples[0].value.is_nan());
        assert_eq!(decoded.families[2].samples[0].value, -1500.0);
    }

    #[test]
    fn round_trip_preserves_samples() {
        let input = "\
# HELP http_requests_total Requests.
# TYPE http_requests_total counter
http_requests_total{code=\"200\",method=\"get\"} 10
http_requests_total{code=\"500\",method=\"post\"} 0.5 1700000000000
";
        let decoded = decode(input).unwrap();
        let encoded = exposition::encode(&decoded.families);
        assert_eq!(encoded, input);

        let again = decode(&encoded).unwrap();
        assert_eq!(again.families, decoded.families);
    }
}
