use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    consts::ANALYSIS_FUNCTION_NAME,
    engine::loader::{self, AnalysisFunction, LoadDiagnostic, LoadOutcome, LoadState},
    error::FramelensError,
};

/// External code-generation collaborator: given one representative
/// frame's fused records and the user question, returns source text
/// defining the analysis function.
#[async_trait]
pub trait CodeSynthesis: Send + Sync {
    async fn synthesize(
        &self,
        sample_metadata: &serde_json::Value,
        question: &str,
    ) -> Result<String, FramelensError>;
}

enum CacheSlot {
    Empty,
    Loaded(AnalysisFunction),
    LoadFailed(LoadDiagnostic),
}

/// Owns the single synthesized analysis function for one session.
///
/// A single-assignment cache, not an LRU: one slot, filled at most
/// once, keyed by session identity. The slot lock is held across the
/// synthesis round-trip, so under concurrent frame workers exactly one
/// caller synthesizes while the rest block and then observe the
/// decided state. Once `Loaded` or `LoadFailed`, the decision stands
/// for the rest of the session; a later invocation failure never
/// reopens it.
pub struct AnalysisExecutor {
    slot: Mutex<CacheSlot>,
    function_name: String,
}

impl AnalysisExecutor {
    pub fn new() -> Self {
        Self::with_function_name(ANALYSIS_FUNCTION_NAME)
    }

    pub fn with_function_name(function_name: &str) -> Self {
        Self {
            slot: Mutex::new(CacheSlot::Empty),
            function_name: function_name.to_string(),
        }
    }

    /// Fills the cache slot on first demand; a no-op once the slot is
    /// decided.
    ///
    /// A collaborator failure during synthesis propagates to the
    /// caller and leaves the slot empty; only an actual load attempt
    /// decides it.
    pub async fn ensure_ready(
        &self,
        sample_metadata: &serde_json::Value,
        question: &str,
        synthesis: &dyn CodeSynthesis,
    ) -> Result<LoadState, FramelensError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            CacheSlot::Loaded(_) => return Ok(LoadState::Loaded),
            CacheSlot::LoadFailed(_) => return Ok(LoadState::LoadFailed),
            CacheSlot::Empty => {}
        }

        info!("requesting analysis function synthesis");
        let source = synthesis.synthesize(sample_metadata, question).await?;

        match loader::load(&source, &self.function_name) {
            LoadOutcome::Loaded(function) => {
                info!("analysis function loaded and cached for the session");
                *slot = CacheSlot::Loaded(function);
                Ok(LoadState::Loaded)
            }
            LoadOutcome::Failed(diagnostic) => {
                warn!("analysis function load failed for the session: {diagnostic}");
                *slot = CacheSlot::LoadFailed(diagnostic);
                Ok(LoadState::LoadFailed)
            }
        }
    }

    pub async fn state(&self) -> LoadState {
        match &*self.slot.lock().await {
            CacheSlot::Empty => LoadState::Unloaded,
            CacheSlot::Loaded(_) => LoadState::Loaded,
            CacheSlot::LoadFailed(_) => LoadState::LoadFailed,
        }
    }

    /// Invokes the cached function against one frame's metadata.
    ///
    /// `NotReady` when the slot is empty or the load failed;
    /// `ExecutionFailure` when the function itself raises, which is
    /// local to the frame and leaves the cached state untouched.
    pub async fn run(
        &self,
        frame: &str,
        metadata: &serde_json::Value,
    ) -> Result<serde_json::Value, FramelensError> {
        let slot = self.slot.lock().await;
        match &*slot {
            CacheSlot::Empty => Err(FramelensError::NotReady {
                reason: "no analysis function has been synthesized".to_string(),
            }),
            CacheSlot::LoadFailed(diagnostic) => Err(FramelensError::NotReady {
                reason: format!("analysis function failed to load: {diagnostic}"),
            }),
            CacheSlot::Loaded(function) => function.invoke(frame, metadata),
        }
    }
}

impl Default for AnalysisExecutor {
    fn default() -> Self {
        Self::new()
    }
}
