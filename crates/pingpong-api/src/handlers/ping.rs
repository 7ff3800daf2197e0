use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use pingpong_common::time;
use pingpong_metrics::{MetricFamily, MetricType, Sample};
use tracing::{info, warn};

use crate::router::ApiState;

pub const PING_METRIC: &str = "ping_request_count";

/// Query parameters copied onto the ping counter, with their defaults.
const PING_LABELS: [(&str, &str); 9] = [
    ("path", "/tmp/kafka_upload"),
    ("receiver", "default-receiver-sre"),
    ("webhook", ""),
    ("routing_key", ""),
    ("extra_slack_recipient", ""),
    ("extra_slack_recipient_sre", ""),
    ("instance", "pingpong"),
    ("arg1", ""),
    ("arg2", ""),
];

pub async fn ping(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let now = time::now();

    let labels = PING_LABELS
        .iter()
        .map(|(name, default)| {
            let value = params
                .get(*name)
                .filter(|value| !value.is_empty())
                .map_or(*default, String::as_str);
            (name.to_string(), value.to_string())
        })
        .collect();

    let report = state.registry.create(&[MetricFamily {
        name: PING_METRIC.to_string(),
        help: "No of request handled by Ping handler (to /ping)".to_string(),
        metric_type: MetricType::Counter,
        samples: vec![Sample::new(labels, 1.0)],
    }]);
    for err in &report.errors {
        warn!(error = %err, "failed to count ping");
    }

    info!(at = %now.to_rfc3339(), "ping request handled");
    format!("PONG - {}\n", now.to_rfc3339())
}

pub async fn current_time() -> impl IntoResponse {
    format!("The time is: {}\n", time::format_rfc1123(&time::now()))
}
