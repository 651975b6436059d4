//! Metrics definitions for the relay.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RELAY_REQUEST: MetricDef = MetricDef {
    name: "relay.request",
    metric_type: MetricType::Counter,
    description: "Number of inbound API requests, tagged by route and response status",
};

pub const RELAY_REQUEST_DURATION: MetricDef = MetricDef {
    name: "relay.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to answer an inbound API request in seconds, backend calls included",
};

pub const RELAY_UPLOAD_FILES: MetricDef = MetricDef {
    name: "relay.upload.files",
    metric_type: MetricType::Histogram,
    description: "Number of file parts relayed by a single proxy upload",
};

pub const ALL_METRICS: &[MetricDef] = &[RELAY_REQUEST, RELAY_REQUEST_DURATION, RELAY_UPLOAD_FILES];
