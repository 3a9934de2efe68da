//! Executor interface.
//!
//! An executor performs the real remote work for one operation type.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::features::queue::Payload;

/// Performs operations of one type against the remote side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the operation.
    ///
    /// `Ok(true)` is success, `Ok(false)` a failure the executor detected
    /// itself, and `Err` an unexpected error. All three are recorded on the
    /// operation; none of them aborts the sync pass.
    async fn execute(&self, payload: &Payload) -> anyhow::Result<bool>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    async fn execute(&self, payload: &Payload) -> anyhow::Result<bool> {
        (self.0)(payload.clone()).await
    }
}

/// Wrap an async closure as an executor.
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn Executor>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_executor_fn_passes_payload() {
        let executor = executor_fn(|payload: Payload| async move {
            Ok(payload.get("ok").and_then(serde_json::Value::as_bool) == Some(true))
        });

        let mut payload = Payload::new();
        assert!(!executor.execute(&payload).await.unwrap());

        payload.insert("ok".to_string(), true.into());
        assert!(executor.execute(&payload).await.unwrap());
    }
}
