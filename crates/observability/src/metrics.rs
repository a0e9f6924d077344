//! 输出管线指标收集模块
//!
//! 记录事件接收、chunk 追加、刷新、重试与丢弃，并在内存中聚合投递统计。

use metrics::{counter, gauge, histogram};
use std::collections::BTreeMap;

/// 记录 output 接收的事件数
pub fn record_events_emitted(output: &str, tag: &str, count: usize) {
    counter!(
        "chunkline_events_emitted_total",
        "output" => output.to_string(),
        "tag" => tag.to_string()
    )
    .increment(count as u64);
}

/// 记录被拒绝的 emit 调用 (未就绪、无路由、缓冲满...)
pub fn record_emit_rejected(output: &str, reason: &str) {
    counter!(
        "chunkline_emit_rejected_total",
        "output" => output.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录一次追加到缓冲区的 chunk 数据
pub fn record_chunk_appended(output: &str, records: usize, bytes: usize) {
    counter!("chunkline_records_appended_total", "output" => output.to_string())
        .increment(records as u64);
    counter!("chunkline_bytes_appended_total", "output" => output.to_string())
        .increment(bytes as u64);
}

/// 记录 chunk 写出成功
pub fn record_chunk_flushed(output: &str, writer: &str, records: usize, bytes: usize) {
    counter!(
        "chunkline_chunks_flushed_total",
        "output" => output.to_string(),
        "writer" => writer.to_string()
    )
    .increment(1);
    counter!("chunkline_records_flushed_total", "output" => output.to_string())
        .increment(records as u64);
    histogram!("chunkline_chunk_bytes", "output" => output.to_string()).record(bytes as f64);
}

/// 记录刷新重试
pub fn record_flush_retry(output: &str, attempt: u32) {
    counter!("chunkline_flush_retries_total", "output" => output.to_string()).increment(1);
    gauge!("chunkline_flush_last_attempt", "output" => output.to_string()).set(f64::from(attempt));
}

/// 记录重试耗尽后丢弃的 chunk
pub fn record_chunk_discarded(output: &str) {
    counter!("chunkline_chunks_discarded_total", "output" => output.to_string()).increment(1);
}

/// 记录无法路由的 tag
pub fn record_route_miss(tag: &str) {
    counter!("chunkline_route_miss_total", "tag" => tag.to_string()).increment(1);
}

/// 记录待写出队列深度
pub fn record_buffer_queue_depth(output: &str, depth: usize) {
    gauge!("chunkline_buffer_queue_depth", "output" => output.to_string()).set(depth as f64);
}

/// 单个 output 的投递统计
#[derive(Debug, Clone, Default)]
pub struct OutputDeliveryStats {
    /// 接收事件数
    pub events_emitted: u64,

    /// 被拒绝的 emit 调用数
    pub emits_rejected: u64,

    /// 成功写出的 chunk 数
    pub chunks_flushed: u64,

    /// 成功写出的记录数
    pub records_flushed: u64,

    /// 重试次数
    pub flush_retries: u64,

    /// 丢弃的 chunk 数
    pub chunks_discarded: u64,

    /// chunk 大小统计 (字节)
    pub chunk_bytes: RunningStats,

    /// 写出耗时统计 (毫秒，含重试)
    pub flush_latency_ms: RunningStats,
}

impl OutputDeliveryStats {
    /// 记录一次成功写出
    pub fn record_flush(&mut self, records: usize, bytes: usize, latency_ms: f64) {
        self.chunks_flushed += 1;
        self.records_flushed += records as u64;
        self.chunk_bytes.push(bytes as f64);
        self.flush_latency_ms.push(latency_ms);
    }

    fn merge(&mut self, other: &OutputDeliveryStats) {
        self.events_emitted += other.events_emitted;
        self.emits_rejected += other.emits_rejected;
        self.chunks_flushed += other.chunks_flushed;
        self.records_flushed += other.records_flushed;
        self.flush_retries += other.flush_retries;
        self.chunks_discarded += other.chunks_discarded;
        self.chunk_bytes.merge(&other.chunk_bytes);
        self.flush_latency_ms.merge(&other.flush_latency_ms);
    }
}

/// 投递统计聚合器
///
/// 在内存中按 output 聚合统计，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsAggregator {
    /// 各 output 统计
    pub outputs: BTreeMap<String, OutputDeliveryStats>,
}

impl DeliveryStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个 output 的统计
    pub fn update(&mut self, output: &str, stats: &OutputDeliveryStats) {
        self.outputs
            .entry(output.to_string())
            .or_default()
            .merge(stats);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliverySummary {
        let mut total = OutputDeliveryStats::default();
        for stats in self.outputs.values() {
            total.merge(stats);
        }

        DeliverySummary {
            outputs: self.outputs.len(),
            events_emitted: total.events_emitted,
            emits_rejected: total.emits_rejected,
            chunks_flushed: total.chunks_flushed,
            records_flushed: total.records_flushed,
            flush_retries: total.flush_retries,
            chunks_discarded: total.chunks_discarded,
            delivery_rate: if total.events_emitted > 0 {
                total.records_flushed as f64 / total.events_emitted as f64 * 100.0
            } else {
                0.0
            },
            chunk_bytes: StatsSummary::from(&total.chunk_bytes),
            flush_latency_ms: StatsSummary::from(&total.flush_latency_ms),
            per_output: self
                .outputs
                .iter()
                .map(|(name, s)| (name.clone(), (s.chunks_flushed, s.records_flushed)))
                .collect(),
        }
    }
}

/// 投递摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub outputs: usize,
    pub events_emitted: u64,
    pub emits_rejected: u64,
    pub chunks_flushed: u64,
    pub records_flushed: u64,
    pub flush_retries: u64,
    pub chunks_discarded: u64,
    pub delivery_rate: f64,
    pub chunk_bytes: StatsSummary,
    pub flush_latency_ms: StatsSummary,
    /// output -> (chunks, records)
    pub per_output: BTreeMap<String, (u64, u64)>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Outputs: {}", self.outputs)?;
        writeln!(f, "Events emitted: {}", self.events_emitted)?;
        writeln!(f, "Emits rejected: {}", self.emits_rejected)?;
        writeln!(
            f,
            "Records flushed: {} ({:.2}%)",
            self.records_flushed, self.delivery_rate
        )?;
        writeln!(f, "Chunks flushed: {}", self.chunks_flushed)?;
        writeln!(f, "Flush retries: {}", self.flush_retries)?;
        writeln!(f, "Chunks discarded: {}", self.chunks_discarded)?;
        writeln!(f, "Chunk size (bytes): {}", self.chunk_bytes)?;
        writeln!(f, "Flush latency (ms): {}", self.flush_latency_ms)?;

        if !self.per_output.is_empty() {
            writeln!(f, "Per output:")?;
            for (name, (chunks, records)) in &self.per_output {
                writeln!(f, "  {}: {} chunks, {} records", name, chunks, records)?;
            }
        }

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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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

    /// 合并另一组统计 (Chan 并行公式)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let n = n1 + n2;
        let delta = other.mean - self.mean;

        self.mean += delta * n2 / n;
        self.m2 += other.m2 + delta * delta * n1 * n2 / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
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

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
