//! Request body of the streaming chat endpoint

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user's message as the backend expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptObject {
    pub content: String,
    pub role: String,
    pub id: String,
}

/// `POST /api/chat` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: PromptObject,
    pub thread_id: String,
    pub response_id: String,
}

impl ChatRequest {
    /// Build a request for `thread_id` with fresh message and response ids
    pub fn new(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            prompt: PromptObject {
                content: content.into(),
                role: "user".to_string(),
                id: Uuid::new_v4().to_string(),
            },
            thread_id: thread_id.into(),
            response_id: Uuid::new_v4().to_string(),
        }
    }
}
