use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

/// Successful reply to `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub text: String,
}
