use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body the engine returns with a non-success status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineErrorBody {
    pub detail: String,
}

/// A request the engine accepted on the wire but refused to perform.
#[derive(Debug, Clone, Error)]
#[error("engine rejected request ({status}): {detail}")]
pub struct EngineRejection {
    pub status: u16,
    pub detail: String,
}

impl EngineRejection {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}
