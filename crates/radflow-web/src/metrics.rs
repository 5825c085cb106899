//! 请求指标

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use radflow_core::{RadflowError, Result};
use std::time::Duration;

fn metrics_error(e: prometheus::Error) -> RadflowError {
    RadflowError::Internal(format!("Metrics error: {}", e))
}

/// `/exec` 请求指标
#[derive(Debug, Clone)]
pub struct ExecMetrics {
    registry: Registry,
    /// 按动作和结果统计的请求数
    requests_total: IntCounterVec,
    /// 按动作统计的处理耗时
    request_duration: HistogramVec,
}

impl ExecMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("radflow_exec_requests_total", "Total number of /exec requests"),
            &["action", "status"],
        )
        .map_err(metrics_error)?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "radflow_exec_duration_seconds",
                "Time spent handling /exec requests",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["action"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(request_duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
        })
    }

    pub fn record(&self, action: &str, success: bool, elapsed: Duration) {
        let status = if success { "success" } else { "error" };
        self.requests_total.with_label_values(&[action, status]).inc();
        self.request_duration
            .with_label_values(&[action])
            .observe(elapsed.as_secs_f64());
    }

    pub fn request_count(&self, action: &str, success: bool) -> u64 {
        let status = if success { "success" } else { "error" };
        self.requests_total.with_label_values(&[action, status]).get()
    }

    /// Prometheus文本格式
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| RadflowError::Internal(e.to_string()))
    }
}
