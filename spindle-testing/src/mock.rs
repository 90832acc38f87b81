// Mock utilities for testing

use parking_lot::Mutex;
use spindle_core::{ParamDeclaration, ParamResolver, ParamValue, ResolveData, Resolved};
use std::sync::Arc;

/// Parameter resolver that records every call and answers with a fixed
/// value.
///
/// Clones share the same call log, so a clone can be declared on a method
/// while the original is kept for assertions.
///
/// ```
/// use spindle_testing::MockResolver;
///
/// let mock = MockResolver::returning("stub");
/// let declaration = mock.declaration("mock");
/// assert_eq!(declaration.name(), "mock");
/// assert_eq!(mock.call_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockResolver {
    calls: Arc<Mutex<Vec<ParamValue>>>,
    value: Option<ParamValue>,
}

impl MockResolver {
    /// Pass the previous value through unchanged.
    pub fn passthrough() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            value: None,
        }
    }

    pub fn returning(value: impl Into<ParamValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::passthrough()
        }
    }

    /// Declaration using this mock as an instance resolver.
    pub fn declaration(&self, name: &'static str) -> ParamDeclaration {
        ParamDeclaration::instance(name, self.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Values received from the previous resolver of the chain.
    pub fn received(&self) -> Vec<ParamValue> {
        self.calls.lock().clone()
    }

    pub fn was_called(&self) -> bool {
        !self.calls.lock().is_empty()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl ParamResolver for MockResolver {
    fn resolve_param(&self, _data: &ResolveData, previous: ParamValue) -> Resolved {
        self.calls.lock().push(previous.clone());
        Resolved::ready(self.value.clone().unwrap_or(previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_previous_values() {
        let mock = MockResolver::returning("stub");
        let data = ResolveData::new();

        let value = mock.resolve_param(&data, ParamValue::from(1i64)).resolve().await.unwrap();
        assert_eq!(value.as_str(), Some("stub"));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.received()[0].as_json(), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let mock = MockResolver::passthrough();
        let value = mock
            .clone()
            .resolve_param(&ResolveData::new(), ParamValue::from("x"))
            .resolve()
            .await
            .unwrap();
        assert_eq!(value.as_str(), Some("x"));
        assert!(mock.was_called());

        mock.clear_calls();
        assert!(!mock.was_called());
    }
}
