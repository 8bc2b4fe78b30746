use serde_json::{json, Value};
use tracing::debug;

use super::{
    ensure_success, error_message, extract_chat_content, post_bearer, read_json, user_message,
    Call,
};
use crate::error::AdapterError;
use crate::models::{ModelKind, Reply};

/**
 * \brief Fireworks 的错误体多为 `{"fault": {"faultstring": ...}}`。
 */
fn fireworks_reason(v: &Value) -> Option<String> {
    v.pointer("/fault/faultstring")
        .and_then(|f| f.as_str())
        .map(|s| s.to_string())
        .or_else(|| error_message(v))
}

/**
 * \brief 按所选模型的形态分流：图片模型走 image_generation，文本模型走 chat completions。
 */
pub(crate) async fn generate(call: &Call<'_>) -> Result<Reply, AdapterError> {
    match call.model.kind {
        ModelKind::Image => generate_image(call).await,
        ModelKind::Text => complete(call).await,
    }
}

async fn generate_image(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let url = format!(
        "{}/inference/v1/image_generation/{}",
        call.settings.endpoints.fireworks.trim_end_matches('/'),
        call.model.id
    );
    let body = json!({
        "prompt": call.request.prompt,
        "n": 1,
        "size": "1024x1024",
        "response_format": "b64_json",
    });
    debug!(model = call.model.id, "fireworks image request");

    let resp = post_bearer(call.client, &url, call.credential, &body).await?;
    let resp = ensure_success(resp, "Fireworks Image Gen Error", fireworks_reason).await?;
    let v = read_json(resp).await?;
    let b64 = extract_b64(&v)
        .ok_or_else(|| AdapterError::Malformed("Fireworks returned no image data".into()))?;
    Ok(Reply::image(format!("data:image/png;base64,{}", b64)))
}

async fn complete(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let url = format!(
        "{}/inference/v1/chat/completions",
        call.settings.endpoints.fireworks.trim_end_matches('/')
    );
    let body = json!({
        "model": call.model.id,
        "messages": [user_message(call.request)],
        "max_tokens": 1024,
    });
    debug!(model = call.model.id, image = call.request.has_image(), "fireworks chat request");

    let resp = post_bearer(call.client, &url, call.credential, &body).await?;
    let resp = ensure_success(resp, "Fireworks Chat Error", fireworks_reason).await?;
    let v = read_json(resp).await?;
    let text = extract_chat_content(&v)
        .ok_or_else(|| AdapterError::Malformed("Fireworks returned no message content".into()))?;
    Ok(Reply::text(text))
}

/**
 * \brief 兼容裸数组 `[{"b64_json"}]` 与 `{"data": [{"b64_json"}]}` 两种返回。
 */
fn extract_b64(v: &Value) -> Option<&str> {
    let first = match v {
        Value::Array(items) => items.first(),
        _ => v.get("data").and_then(|d| d.get(0)),
    }?;
    first
        .get("b64_json")
        .and_then(|b| b.as_str())
        .filter(|b| !b.is_empty())
}
