//! Contract for the install engine consumed by the orchestrator.
//!
//! The engine does the real work (manifest fetch, module download, unzip,
//! copy, per-module retry). The orchestrator only constructs it, hands it a
//! cancellation token and an event sink, and interprets its result.
//!
//! # Design Decisions
//!
//! - **Explicit `Pin<Box<dyn Future>>`** instead of `#[async_trait]`, so
//!   the returned future type is visible at the impl site.
//! - **Factory + engine split**: an engine is bound to one install at
//!   construction, matching the engine's own `(url, dest, signal, options)`
//!   constructor; the factory is what the manager stores.
//! - **Structured errors**: engines report [`EngineError`] with an
//!   [`EngineErrorKind`](crate::errors::EngineErrorKind); engines that only
//!   produce text convert with [`EngineError::from_message`] at their edge.
//!
//! # Engine obligations
//!
//! - Check [`EngineRequest::cancellation`] between phases and between retry
//!   attempts, returning [`EngineError::aborted`] once it is signaled.
//! - Raise events in real phase order: a module's download events precede
//!   its unzip events, which precede its copy events.
//! - Perform at most `options.max_module_retries` retries per module.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::cancellation::CancellationToken;
use crate::errors::EngineError;
use crate::models::EngineOptions;
use crate::observer::EventSink;

/// Everything an engine is bound to at construction.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub source_url: String,
    pub dest_dir: PathBuf,
    pub cancellation: CancellationToken,
    pub options: EngineOptions,
}

/// One bound install. `install` is called exactly once.
pub trait InstallEngine: Send + Sync {
    /// Run the install to completion, raising lifecycle events into `events`.
    ///
    /// `Ok(())` on success; `Err` with a classified kind for recognized
    /// failures (including `UserAborted` after cancellation), or
    /// `Unclassified` for anything else.
    fn install(
        &self,
        events: EventSink,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + '_>>;
}

/// Builds engines for the manager.
pub trait EngineFactory: Send + Sync {
    fn create(&self, request: EngineRequest) -> Box<dyn InstallEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(EngineRequest) -> Box<dyn InstallEngine> + Send + Sync,
{
    fn create(&self, request: EngineRequest) -> Box<dyn InstallEngine> {
        self(request)
    }
}
