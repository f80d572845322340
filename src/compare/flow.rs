//! Static description of the two processing flows, used for visualisation.
//! Time shares are illustrative and never derived from measurements.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowStage {
    pub name: &'static str,
    pub description: &'static str,
    /// Illustrative share of the run, 0-100.
    pub time_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowDiagram {
    pub stages: &'static [FlowStage],
    pub characteristics: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub metric: &'static str,
    pub batch: &'static str,
    pub stream: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowMetadata {
    pub batch_flow: FlowDiagram,
    pub stream_flow: FlowDiagram,
    pub comparison_table: &'static [ComparisonRow],
}

const fn stage(name: &'static str, description: &'static str, time_percent: u8) -> FlowStage {
    FlowStage {
        name,
        description,
        time_percent,
    }
}

const fn row(metric: &'static str, batch: &'static str, stream: &'static str) -> ComparisonRow {
    ComparisonRow {
        metric,
        batch,
        stream,
    }
}

const BATCH_STAGES: &[FlowStage] = &[
    stage("Data Input", "Large dataset loaded into memory", 5),
    stage("Batch Division", "Split data into fixed-size batches", 5),
    stage("Preprocessing", "Clean and normalize all texts in batch", 20),
    stage("Parallel Processing", "Analyze batches using worker pool", 50),
    stage("Aggregation", "Combine results and calculate statistics", 15),
    stage("Output", "Return complete dataset results", 5),
];

const BATCH_CHARACTERISTICS: &[&str] = &[
    "High throughput",
    "Optimized for large datasets",
    "Parallel processing",
    "Resource efficient",
    "Delayed results",
];

const STREAM_STAGES: &[FlowStage] = &[
    stage("Data Arrival", "Individual item received", 5),
    stage("Immediate Processing", "Process item as it arrives", 15),
    stage("Preprocessing", "Clean and normalize single text", 20),
    stage("Analysis", "Perform sentiment analysis", 40),
    stage("Metrics Update", "Update sliding window statistics", 10),
    stage("Output", "Return result immediately", 10),
];

const STREAM_CHARACTERISTICS: &[&str] = &[
    "Low latency",
    "Real-time results",
    "Sequential processing",
    "Continuous operation",
    "Immediate feedback",
];

const COMPARISON_TABLE: &[ComparisonRow] = &[
    row("Latency", "High (seconds)", "Low (milliseconds)"),
    row("Throughput", "Very High", "Moderate"),
    row("Resource Usage", "Burst (peaks)", "Steady (constant)"),
    row("Use Case", "Historical Analysis", "Real-time Monitoring"),
    row("Scalability", "Horizontal (workers)", "Vertical (single item)"),
    row("Result Delivery", "All at once", "Item by item"),
    row("Memory Footprint", "Large (full dataset)", "Small (sliding window)"),
];

pub fn flow_metadata() -> FlowMetadata {
    FlowMetadata {
        batch_flow: FlowDiagram {
            stages: BATCH_STAGES,
            characteristics: BATCH_CHARACTERISTICS,
        },
        stream_flow: FlowDiagram {
            stages: STREAM_STAGES,
            characteristics: STREAM_CHARACTERISTICS,
        },
        comparison_table: COMPARISON_TABLE,
    }
}
