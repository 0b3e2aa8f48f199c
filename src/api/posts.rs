//! Post creation endpoint (/2/tweets)

use serde::Deserialize;

use super::client::AuthenticatedClient;
use crate::auth::AuthError;

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: PostData,
}

/// The post as echoed back by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct PostData {
    pub id: String,
    pub text: String,
}

/// Publish `text` as a new post.
pub async fn publish(
    client: &AuthenticatedClient,
    url: &str,
    text: &str,
) -> Result<PostData, AuthError> {
    let resp = client
        .post_json(url, &serde_json::json!({ "text": text }))
        .await?;
    let status = resp.status().as_u16();
    let created: CreatePostResponse = resp.json().await.map_err(|e| AuthError::RequestFailed {
        status: Some(status),
        body: format!("Failed to parse post response: {}", e),
    })?;
    tracing::info!("Published post {}", created.data.id);
    Ok(created.data)
}
