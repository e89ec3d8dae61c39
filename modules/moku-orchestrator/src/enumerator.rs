//! The enumerator: an external collaborator, deliberately left open-ended —
//! "any function `enumerate(ctx, origin) -> urls[]` that respects the web client
//! contract." Its crawl policy (link extraction, depth limits, host scoping)
//! is explicitly out of scope; this crate only defines the seam the
//! orchestrator calls through.

use async_trait::async_trait;
use moku_core::CancellationToken;

#[async_trait]
pub trait Enumerator: Send + Sync {
    /// `concurrency` is a hint the concrete crawler may use to bound its own
    /// fan-out; the orchestrator does not otherwise interpret it. Crawl
    /// policy (link extraction, depth limits, host scoping) is out of scope.
    async fn enumerate(
        &self,
        cancel: CancellationToken,
        origin: &str,
        concurrency: usize,
    ) -> Result<Vec<String>, String>;
}

/// An enumerator that always yields no URLs. Used where no real crawler is
/// wired in yet; not a stand-in for crawl policy, just a safe default.
pub struct NullEnumerator;

#[async_trait]
impl Enumerator for NullEnumerator {
    async fn enumerate(&self, _cancel: CancellationToken, _origin: &str, _concurrency: usize) -> Result<Vec<String>, String> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
pub struct StaticEnumerator(pub Vec<String>);

#[cfg(test)]
#[async_trait]
impl Enumerator for StaticEnumerator {
    async fn enumerate(&self, _cancel: CancellationToken, _origin: &str, _concurrency: usize) -> Result<Vec<String>, String> {
        Ok(self.0.clone())
    }
}
