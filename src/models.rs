use serde::Serialize;

// Error envelope shared with the app's own API routes:
// { "success": false, "error": { "code": ..., "message": ..., "retryAfter": ... } }
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code,
                message: message.into(),
                retry_after: None,
            },
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.error.retry_after = Some(secs);
        self
    }
}

#[derive(Serialize, Debug)]
pub struct BackendSummary {
    pub total: usize,
    pub healthy: usize,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub backends: BackendSummary,
}
