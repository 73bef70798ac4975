//! Producer 指标收集模块
//!
//! 基于 DeliveryReport 与批次事件收集和统计日志投递管道的运行指标。

use contracts::{DeliveryError, DeliveryReport};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 注册指标描述 (Prometheus HELP 文本)
pub fn describe() {
    describe_counter!(
        "log_producer_entries_submitted_total",
        "Entries accepted into the submission queue"
    );
    describe_counter!(
        "log_producer_queue_full_total",
        "Submissions rejected because the queue stayed full"
    );
    describe_counter!(
        "log_producer_batches_flushed_total",
        "Batches removed from the live map, by flush reason"
    );
    describe_histogram!(
        "log_producer_batch_entries",
        Unit::Count,
        "Entries per flushed batch"
    );
    describe_histogram!(
        "log_producer_batch_bytes",
        Unit::Bytes,
        "Accounted bytes per flushed batch"
    );
    describe_counter!(
        "log_producer_batches_completed_total",
        "Batches that reached a terminal outcome"
    );
    describe_counter!(
        "log_producer_entries_completed_total",
        "Entries that reached a terminal outcome"
    );
    describe_histogram!(
        "log_producer_delivery_attempts",
        Unit::Count,
        "Delivery attempts per terminal batch"
    );
    describe_counter!("log_producer_retries_total", "Retries scheduled");
    describe_histogram!(
        "log_producer_retry_delay_ms",
        Unit::Milliseconds,
        "Backoff delay of scheduled retries"
    );
    describe_gauge!(
        "log_producer_pending_bytes",
        Unit::Bytes,
        "Accepted bytes not yet terminal"
    );
    describe_gauge!("log_producer_open_batches", "Batches open in the live map");
}

/// 记录一次提交被接受
pub fn record_entry_submitted(topic: &str) {
    counter!(
        "log_producer_entries_submitted_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录一次因队列满被拒绝的提交
pub fn record_queue_full() {
    counter!("log_producer_queue_full_total").increment(1);
}

/// 记录批次离开 live map
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_batch_flushed;
///
/// record_batch_flushed("linger", batch.len(), batch.total_size());
/// ```
pub fn record_batch_flushed(reason: &str, entry_count: usize, byte_size: u64) {
    counter!(
        "log_producer_batches_flushed_total",
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!("log_producer_batch_entries").record(entry_count as f64);
    histogram!("log_producer_batch_bytes").record(byte_size as f64);
}

/// 记录批次终态
pub fn record_delivery(transport: &str, report: &DeliveryReport) {
    let status = match report.error() {
        None => "delivered",
        Some(DeliveryError::Fatal { .. }) => "fatal",
        Some(DeliveryError::RetryExhausted { .. }) => "exhausted",
    };
    counter!(
        "log_producer_batches_completed_total",
        "transport" => transport.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    counter!(
        "log_producer_entries_completed_total",
        "transport" => transport.to_string(),
        "status" => status.to_string()
    )
    .increment(report.entry_count as u64);
    histogram!("log_producer_delivery_attempts").record(f64::from(report.attempts));
}

/// 记录一次重试调度
pub fn record_retry_scheduled(transport: &str, delay_ms: u64) {
    counter!(
        "log_producer_retries_total",
        "transport" => transport.to_string()
    )
    .increment(1);
    histogram!("log_producer_retry_delay_ms").record(delay_ms as f64);
}

/// 记录未终结的字节数
pub fn record_pending_bytes(bytes: u64) {
    gauge!("log_producer_pending_bytes").set(bytes as f64);
}

/// 记录 live map 中打开的批次数
pub fn record_open_batches(count: usize) {
    gauge!("log_producer_open_batches").set(count as f64);
}

/// 投递结果聚合器
///
/// 在内存中聚合 DeliveryReport，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryMetricsAggregator {
    /// 成功批次数
    pub delivered_batches: u64,

    /// 成功条目数
    pub delivered_entries: u64,

    /// 致命失败批次数
    pub fatal_batches: u64,

    /// 重试耗尽批次数
    pub exhausted_batches: u64,

    /// 失败条目数
    pub failed_entries: u64,

    /// 批次字节数统计
    pub batch_bytes: RunningStats,

    /// 投递尝试次数统计
    pub attempts: RunningStats,
}

impl DeliveryMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, report: &DeliveryReport) {
        match report.error() {
            None => {
                self.delivered_batches += 1;
                self.delivered_entries += report.entry_count as u64;
            }
            Some(DeliveryError::Fatal { .. }) => {
                self.fatal_batches += 1;
                self.failed_entries += report.entry_count as u64;
            }
            Some(DeliveryError::RetryExhausted { .. }) => {
                self.exhausted_batches += 1;
                self.failed_entries += report.entry_count as u64;
            }
        }

        self.batch_bytes.push(report.byte_size as f64);
        self.attempts.push(f64::from(report.attempts));
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total = self.delivered_batches + self.fatal_batches + self.exhausted_batches;
        MetricsSummary {
            total_batches: total,
            delivered_batches: self.delivered_batches,
            delivered_entries: self.delivered_entries,
            fatal_batches: self.fatal_batches,
            exhausted_batches: self.exhausted_batches,
            failed_entries: self.failed_entries,
            failure_rate: if total > 0 {
                (self.fatal_batches + self.exhausted_batches) as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            batch_bytes: StatsSummary::from(&self.batch_bytes),
            attempts: StatsSummary::from(&self.attempts),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub delivered_batches: u64,
    pub delivered_entries: u64,
    pub fatal_batches: u64,
    pub exhausted_batches: u64,
    pub failed_entries: u64,
    pub failure_rate: f64,
    pub batch_bytes: StatsSummary,
    pub attempts: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Metrics Summary ===")?;
        writeln!(f, "Total batches: {}", self.total_batches)?;
        writeln!(
            f,
            "Delivered: {} batches / {} entries",
            self.delivered_batches, self.delivered_entries
        )?;
        writeln!(
            f,
            "Failed: {} fatal, {} exhausted, {} entries ({:.2}%)",
            self.fatal_batches, self.exhausted_batches, self.failed_entries, self.failure_rate
        )?;
        writeln!(f, "Batch bytes: {}", self.batch_bytes)?;
        writeln!(f, "Attempts: {}", self.attempts)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
