//! Trust store builder and per-source cache.
//!
//! One slot per distinct [`TrustListSource`], keyed by its
//! [`cache_key`](TrustListSource::cache_key). Each slot has its own async
//! mutex, so concurrent callers for an expired source wait on a single
//! rebuild and then share its result, failures included. A rebuild either
//! completes and replaces the slot, or fails and leaves the cached store
//! untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;

use super::fetcher::DocumentFetcher;
use super::parser::{decode_document, filter_by_service_types, parse};
use super::signature::TrustListSignatureVerifier;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::types::{require_non_empty, BuiltTrustStore, TrustListSource, TrustStoreConfig};

#[derive(Default)]
struct SlotState {
  store: Option<Arc<BuiltTrustStore>>,
  // Outcome of the latest rebuild, handed to callers that queued behind it.
  last_error: Option<EngineError>,
}

#[derive(Default)]
struct SlotInner {
  // Bumped after every finished rebuild attempt.
  attempts: AtomicU64,
  state: AsyncMutex<SlotState>,
}

type Slot = Arc<SlotInner>;

pub struct TrustStoreBuilder {
  fetcher: Arc<dyn DocumentFetcher>,
  signature_verifier: Arc<dyn TrustListSignatureVerifier>,
  config: TrustStoreConfig,
  slots: Mutex<HashMap<String, Slot>>,
}

impl TrustStoreBuilder {
  pub fn new(
    fetcher: Arc<dyn DocumentFetcher>,
    signature_verifier: Arc<dyn TrustListSignatureVerifier>,
    config: TrustStoreConfig,
  ) -> Self {
    Self { fetcher, signature_verifier, config, slots: Mutex::new(HashMap::new()) }
  }

  /// Builder backed by the default HTTP fetcher.
  #[cfg(feature = "http")]
  pub fn with_http(
    policy: crate::domain::types::FetchPolicy,
    signature_verifier: Arc<dyn TrustListSignatureVerifier>,
    config: TrustStoreConfig,
  ) -> EngineResult<Self> {
    let fetcher = super::fetcher::HttpFetcher::new(policy)?;
    Ok(Self::new(Arc::new(fetcher), signature_verifier, config))
  }

  pub fn config(&self) -> &TrustStoreConfig {
    &self.config
  }

  fn slots(&self) -> EngineResult<std::sync::MutexGuard<'_, HashMap<String, Slot>>> {
    self
      .slots
      .lock()
      .map_err(|_| EngineError::Panic("trust store cache lock poisoned".into()))
  }

  fn slot(&self, key: &str) -> EngineResult<Slot> {
    let mut slots = self.slots()?;
    Ok(slots.entry(key.to_string()).or_default().clone())
  }

  fn is_fresh(&self, store: &BuiltTrustStore) -> bool {
    // Clock going backwards counts as fresh.
    let age = (Utc::now() - store.fetched_at).to_std().unwrap_or_default();
    age < self.config.cache_ttl
  }

  /// Returns the cached store for `source`, rebuilding it first when it is
  /// missing or older than the TTL.
  #[instrument(skip_all, fields(lotes = source.lotes.len()))]
  pub async fn get_trust_store(&self, source: &TrustListSource) -> EngineResult<Arc<BuiltTrustStore>> {
    require_non_empty(source)?;
    let key = source.cache_key()?;
    let slot = self.slot(&key)?;
    let seen = slot.attempts.load(Ordering::Acquire);
    let mut state = slot.state.lock().await;

    if let Some(store) = state.store.as_ref() {
      if self.is_fresh(store) {
        tracing::debug!(fetched_at = %store.fetched_at, "trust store cache hit");
        return Ok(Arc::clone(store));
      }
    }

    // Another caller finished a rebuild while this one waited.
    if slot.attempts.load(Ordering::Acquire) != seen {
      if let Some(e) = state.last_error.as_ref() {
        tracing::debug!(error = %e, "sharing failed rebuild with waiting caller");
        return self.on_failure(e.replay(), state.store.as_ref());
      }
    }

    if let Some(store) = state.store.as_ref() {
      tracing::debug!(fetched_at = %store.fetched_at, "trust store expired; rebuilding");
    }

    let outcome = self.build(source).await;
    slot.attempts.fetch_add(1, Ordering::AcqRel);
    match outcome {
      Ok(store) => {
        let store = Arc::new(store);
        tracing::info!(
          entities = store.entities.len(),
          certificates = store.certificate_count(),
          next_update = store.next_update.as_deref().unwrap_or("-"),
          "trust store rebuilt"
        );
        state.store = Some(Arc::clone(&store));
        state.last_error = None;
        Ok(store)
      }
      Err(e) => {
        state.last_error = Some(e.replay());
        self.on_failure(e, state.store.as_ref())
      }
    }
  }

  fn on_failure(&self, e: EngineError, previous: Option<&Arc<BuiltTrustStore>>) -> EngineResult<Arc<BuiltTrustStore>> {
    match previous {
      Some(previous) if self.config.serve_stale_on_error => {
        tracing::warn!(error = %e, fetched_at = %previous.fetched_at, "trust store rebuild failed; serving previous store");
        Ok(Arc::clone(previous))
      }
      _ => Err(e),
    }
  }

  async fn build(&self, source: &TrustListSource) -> EngineResult<BuiltTrustStore> {
    let mut entities = Vec::new();
    let mut next_update = None;

    for list in &source.lotes {
      let raw = self.fetcher.fetch(&list.url, self.config.fetch_timeout).await?;
      self.signature_verifier.verify(list, &raw)?;
      let mut parsed = parse(&decode_document(&raw)?)?;
      if let Some(accepted) = &source.accepted_service_types {
        parsed = filter_by_service_types(parsed, accepted);
      }
      tracing::debug!(url = %list.url, entities = parsed.entities.len(), "trust list parsed");
      if next_update.is_none() {
        next_update = parsed.info.next_update;
      }
      entities.extend(parsed.entities);
    }

    Ok(BuiltTrustStore { fetched_at: Utc::now(), next_update, entities })
  }

  /// Drops the cached store for `source`; the next call rebuilds it.
  pub fn invalidate(&self, source: &TrustListSource) -> EngineResult<()> {
    let key = source.cache_key()?;
    self.slots()?.remove(&key);
    Ok(())
  }

  pub fn clear(&self) -> EngineResult<()> {
    self.slots()?.clear();
    Ok(())
  }
}
