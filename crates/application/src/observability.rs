//! 投递观测指标
//!
//! 进程内的通道投递计数与延迟采样。指标记录失败永远不影响
//! 调用方可见的投递结果。

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use domain::Channel;

#[derive(Debug, Default)]
struct MetricState {
    total_sent: u64,
    errors: u64,
    channel_volume: BTreeMap<String, u64>,
    status_counters: BTreeMap<String, u64>,
    /// 延迟采样（毫秒）
    latency_samples: Vec<f64>,
}

/// 指标快照
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_sent: u64,
    pub errors: u64,
    pub channel_volume: BTreeMap<String, u64>,
    pub status_counters: BTreeMap<String, u64>,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub sample_size: usize,
}

/// 投递指标注册表
#[derive(Default)]
pub struct DispatchMetrics {
    state: Mutex<MetricState>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次适配器分发的结果与耗时
    pub fn record(&self, channel: Channel, status: &'static str, latency: Duration) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        state.total_sent += 1;
        *state
            .channel_volume
            .entry(channel.as_str().to_string())
            .or_insert(0) += 1;
        *state.status_counters.entry(status.to_string()).or_insert(0) += 1;
        state.latency_samples.push(latency.as_secs_f64() * 1000.0);
        if status != "delivered" {
            state.errors += 1;
        }

        // 采样缓冲有界，超限时裁剪到一半
        if state.latency_samples.len() > 1000 {
            let excess = state.latency_samples.len() - 500;
            state.latency_samples.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let Ok(state) = self.state.lock() else {
            return MetricsSnapshot {
                total_sent: 0,
                errors: 0,
                channel_volume: BTreeMap::new(),
                status_counters: BTreeMap::new(),
                avg_latency: 0.0,
                p95_latency: 0.0,
                sample_size: 0,
            };
        };

        let latencies = state.latency_samples.clone();
        let avg_latency = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        MetricsSnapshot {
            total_sent: state.total_sent,
            errors: state.errors,
            channel_volume: state.channel_volume.clone(),
            status_counters: state.status_counters.clone(),
            avg_latency,
            p95_latency: percentile(&latencies, 0.95),
            sample_size: state.latency_samples.len(),
        }
    }
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}
