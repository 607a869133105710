// adapters/common.rs

use crate::domain::error::{EngineError, EngineResult};

/// Drives `fut` to completion from synchronous code.
pub fn run_on_current_thread<F, T>(fut: F) -> EngineResult<T>
where
  F: std::future::Future<Output = EngineResult<T>>,
{
  // Inside a multi-thread runtime: block this worker instead of nesting runtimes.
  if let Ok(handle) = tokio::runtime::Handle::try_current() {
    return tokio::task::block_in_place(|| handle.block_on(fut));
  }

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(|e| EngineError::Config(format!("failed to create tokio runtime: {e}")))?;
  rt.block_on(fut)
}
