//! Tag resolution

use std::collections::HashMap;
use std::sync::Arc;

use contracts::Emitter;
use tracing::debug;

use crate::DispatcherError;

/// Capability mapping a tag to the output that should receive it
pub trait Resolvable: Send + Sync {
    fn resolve(&self, tag: &str) -> Option<Arc<dyn Emitter>>;
}

/// Static exact-tag route table
///
/// A tag maps to at most one output; an output may own many tags.
#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn Emitter>>,
    /// Registered outputs in registration order
    outputs: Vec<Arc<dyn Emitter>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every tag in `tags` to `output`
    ///
    /// Nothing is registered when any tag fails.
    ///
    /// # Errors
    /// `EmptyTag`, or `DuplicateTag` when a tag already has a route.
    pub fn register<I, S>(&mut self, tags: I, output: Arc<dyn Emitter>) -> Result<(), DispatcherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();

        for (i, tag) in tags.iter().enumerate() {
            if tag.is_empty() {
                return Err(DispatcherError::EmptyTag {
                    output: output.name().to_string(),
                });
            }
            let existing = self
                .routes
                .get(tag)
                .map(|e| e.name())
                .or_else(|| tags[..i].contains(tag).then(|| output.name()));
            if let Some(existing) = existing {
                return Err(DispatcherError::duplicate_tag(tag, existing, output.name()));
            }
        }

        debug!(output = output.name(), tags = ?tags, "Routes registered");
        for tag in tags {
            self.routes.insert(tag, Arc::clone(&output));
        }
        self.outputs.push(output);
        Ok(())
    }

    /// Registered outputs, in registration order
    pub fn outputs(&self) -> &[Arc<dyn Emitter>] {
        &self.outputs
    }

    /// Tags routed to the output named `name`, sorted
    pub fn tags_for(&self, name: &str) -> Vec<&str> {
        let mut tags: Vec<&str> = self
            .routes
            .iter()
            .filter(|(_, output)| output.name() == name)
            .map(|(tag, _)| tag.as_str())
            .collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Resolvable for RouteTable {
    fn resolve(&self, tag: &str) -> Option<Arc<dyn Emitter>> {
        self.routes.get(tag).cloned()
    }
}
