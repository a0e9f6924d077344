//! RoutingOutput - emitter that delegates by tag

use std::sync::Arc;

use contracts::{Emitter, EventStream, OutputError};
use tracing::{instrument, warn};

use crate::metrics::RouteMetrics;
use crate::route::Resolvable;

/// Emitter resolving every call's tag and forwarding to the matched output
pub struct RoutingOutput<R> {
    name: String,
    resolver: R,
    metrics: Arc<RouteMetrics>,
}

impl<R: Resolvable> RoutingOutput<R> {
    pub fn new(name: impl Into<String>, resolver: R) -> Self {
        Self {
            name: name.into(),
            resolver,
            metrics: Arc::new(RouteMetrics::new()),
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<RouteMetrics> {
        &self.metrics
    }
}

impl<R: Resolvable> Emitter for RoutingOutput<R> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "routing_emits",
        skip(self, stream),
        fields(router = %self.name, events = stream.len())
    )]
    fn emits(&self, tag: &str, stream: &EventStream) -> Result<(), OutputError> {
        let Some(target) = self.resolver.resolve(tag) else {
            self.metrics.inc_miss();
            observability::record_route_miss(tag);
            warn!(router = %self.name, tag, events = stream.len(), "No route for tag");
            return Err(OutputError::no_route(tag));
        };

        match target.emits(tag, stream) {
            Ok(()) => {
                self.metrics.inc_routed(stream.len());
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouteTable;
    use contracts::{EventTime, Record};
    use parking_lot::Mutex;

    /// Emitter double recording (tag, events) per call
    struct Recording {
        name: &'static str,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl Recording {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Emitter for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn emits(&self, tag: &str, stream: &EventStream) -> Result<(), OutputError> {
            self.calls.lock().push((tag.to_string(), stream.len()));
            Ok(())
        }
    }

    #[test]
    fn test_routes_to_matching_output() {
        let a = Recording::new("a");
        let b = Recording::new("b");
        let mut table = RouteTable::new();
        table.register(["app.access"], a.clone()).unwrap();
        table.register(["sys"], b.clone()).unwrap();
        let router = RoutingOutput::new("router", table);

        router.emit("app.access", EventTime::from_secs(1), Record::new()).unwrap();
        router.emit("sys", EventTime::from_secs(2), Record::new()).unwrap();
        router.emit("app.access", EventTime::from_secs(3), Record::new()).unwrap();

        assert_eq!(a.calls.lock().len(), 2);
        assert_eq!(b.calls.lock().as_slice(), &[("sys".to_string(), 1)]);
        assert_eq!(router.metrics().routed_count(), 3);
    }

    #[test]
    fn test_unknown_tag_is_no_route() {
        let a = Recording::new("a");
        let mut table = RouteTable::new();
        table.register(["app"], a.clone()).unwrap();
        let router = RoutingOutput::new("router", table);

        let err = router
            .emit("other", EventTime::from_secs(1), Record::new())
            .unwrap_err();
        assert!(matches!(err, OutputError::NoRoute { ref tag } if tag == "other"));
        assert!(a.calls.lock().is_empty());

        let snapshot = router.metrics().snapshot();
        assert_eq!(snapshot.miss_count, 1);
        assert_eq!(snapshot.routed_count, 0);
    }

    #[test]
    fn test_target_error_propagates() {
        struct Rejecting;
        impl Emitter for Rejecting {
            fn name(&self) -> &str {
                "rejecting"
            }
            fn emits(&self, _tag: &str, _stream: &EventStream) -> Result<(), OutputError> {
                Err(OutputError::not_ready("rejecting", contracts::LifecycleState::Stopped))
            }
        }

        let mut table = RouteTable::new();
        table.register(["t"], Arc::new(Rejecting)).unwrap();
        let router = RoutingOutput::new("router", table);

        let err = router.emit("t", EventTime::from_secs(1), Record::new()).unwrap_err();
        assert!(matches!(err, OutputError::NotReady { .. }));
        assert_eq!(router.metrics().failure_count(), 1);
    }
}
