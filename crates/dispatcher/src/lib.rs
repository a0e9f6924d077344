//! # Dispatcher
//!
//! 按 tag 路由事件。
//!
//! 负责：
//! - `Resolvable` 抽象：tag -> 输出实例
//! - `RouteTable`：精确匹配的静态路由表
//! - `RoutingOutput`：作为 `Emitter` 转发，找不到路由时返回 `NoRoute`，不静默丢弃

pub mod error;
pub mod metrics;
pub mod route;
pub mod router;

pub use contracts::Emitter;
pub use error::DispatcherError;
pub use metrics::{RouteMetrics, RouteMetricsSnapshot};
pub use route::{Resolvable, RouteTable};
pub use router::RoutingOutput;
