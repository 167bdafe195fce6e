use std::fmt;
use std::sync::Arc;

/// A single-predicate filter passed to read operations.
///
/// Created per call site, never mutated, and not retained by the
/// repository beyond the call. The optional `label` is used as the
/// textual form of the query in operation-failure reports; the
/// `no_tracking` flag asks a durable backend to skip change tracking for
/// the results; backends without per-result tracking accept it and
/// ignore it.
pub struct QuerySpec<T> {
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    no_tracking: bool,
    label: Option<String>,
}

impl<T> QuerySpec<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
            no_tracking: false,
            label: None,
        }
    }

    /// Attach a human-readable description used as query text in errors.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_no_tracking(mut self) -> Self {
        self.no_tracking = true;
        self
    }

    pub fn matches(&self, entity: &T) -> bool {
        (self.predicate)(entity)
    }

    pub fn no_tracking(&self) -> bool {
        self.no_tracking
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl<T> Clone for QuerySpec<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            no_tracking: self.no_tracking,
            label: self.label.clone(),
        }
    }
}

impl<T> fmt::Debug for QuerySpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("no_tracking", &self.no_tracking)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_matches() {
        let spec = QuerySpec::new(|n: &i32| *n > 10);
        assert!(spec.matches(&11));
        assert!(!spec.matches(&10));
        assert!(!spec.no_tracking());
        assert!(spec.label().is_none());
    }

    #[test]
    fn builders_set_flags() {
        let spec = QuerySpec::new(|_: &i32| true)
            .with_label("n > 10")
            .with_no_tracking();
        assert!(spec.no_tracking());
        assert_eq!(spec.label(), Some("n > 10"));

        let cloned = spec.clone();
        assert!(cloned.matches(&1));
        assert_eq!(cloned.label(), Some("n > 10"));
    }
}
