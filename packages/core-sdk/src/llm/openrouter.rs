use serde_json::json;
use tracing::debug;

use super::{ensure_success, error_message, extract_chat_content, post_bearer, read_json, Call};
use crate::error::AdapterError;
use crate::models::Reply;

const LABEL: &str = "OpenRouter Error";

/**
 * \brief OpenRouter chat completions，单条用户消息，可内联图片。
 */
pub(crate) async fn complete(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let url = format!(
        "{}/chat/completions",
        call.settings.endpoints.openrouter.trim_end_matches('/')
    );
    let body = json!({
        "model": call.model.id,
        "messages": [super::user_message(call.request)],
    });
    debug!(model = call.model.id, image = call.request.has_image(), "openrouter request");

    let resp = post_bearer(call.client, &url, call.credential, &body).await?;
    let resp = ensure_success(resp, LABEL, error_message).await?;
    let v = read_json(resp).await?;
    let text = extract_chat_content(&v)
        .ok_or_else(|| AdapterError::Malformed("OpenRouter returned no message content".into()))?;
    Ok(Reply::text(text))
}
