pub mod fireworks;
pub mod gemini;
pub mod novita;
pub mod openrouter;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::AdapterError;
use crate::models::{CompareRequest, Model, ProviderId, Reply};
use crate::registry;

/**
 * \brief 一次适配器调用的输入。
 */
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub credential: &'a str,
    pub model_id: &'a str,
    pub request: &'a CompareRequest,
}

/**
 * \brief 适配器内部使用的已解析上下文。
 */
pub(crate) struct Call<'a> {
    pub client: &'a Client,
    pub settings: &'a Settings,
    pub credential: &'a str,
    pub model: &'static Model,
    pub request: &'a CompareRequest,
}

/**
 * \brief 按 Provider 分派到对应适配器，返回归一化结果。
 * \details 模型必须属于该 Provider；适配器之间互不影响，也不做重试。
 */
pub async fn invoke(
    client: &Client,
    settings: &Settings,
    provider: ProviderId,
    invocation: Invocation<'_>,
) -> Result<Reply, AdapterError> {
    let model = registry::resolve_model(provider, invocation.model_id)?;
    let call = Call {
        client,
        settings,
        credential: invocation.credential,
        model,
        request: invocation.request,
    };
    match provider {
        ProviderId::Gemini => gemini::generate(&call).await,
        ProviderId::OpenRouter => openrouter::complete(&call).await,
        ProviderId::Novita => novita::generate(&call).await,
        ProviderId::Fireworks => fireworks::generate(&call).await,
    }
}

pub(crate) type ReasonFn = fn(&Value) -> Option<String>;

pub(crate) async fn post_bearer(
    client: &Client,
    url: &str,
    credential: &str,
    body: &Value,
) -> Result<Response, AdapterError> {
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", credential))
        .json(body)
        .send()
        .await?;
    Ok(resp)
}

/**
 * \brief 非 2xx 时从 Provider 的错误体提取原因，取不到则使用 HTTP 状态描述。
 */
pub(crate) async fn ensure_success(
    resp: Response,
    label: &'static str,
    reason: ReasonFn,
) -> Result<Response, AdapterError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| reason(&v))
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| status_text(status));
    Err(AdapterError::Rejected { label, reason })
}

pub(crate) async fn read_json(resp: Response) -> Result<Value, AdapterError> {
    Ok(resp.json::<Value>().await?)
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|s| s.to_string())
        .unwrap_or_else(|| status.as_str().to_string())
}

/**
 * \brief 通用错误体：`{"error": {"message": ...}}`、`{"error": "..."}` 或 `{"message": ...}`。
 */
pub(crate) fn error_message(v: &Value) -> Option<String> {
    v.pointer("/error/message")
        .and_then(|m| m.as_str())
        .or_else(|| v.get("error").and_then(|e| e.as_str()))
        .or_else(|| v.get("message").and_then(|m| m.as_str()))
        .map(|s| s.to_string())
}

/**
 * \brief OpenAI 风格的单条用户消息，图片以 data URL 内联。
 */
pub(crate) fn user_message(request: &CompareRequest) -> Value {
    let mut content = vec![json!({"type": "text", "text": request.prompt})];
    if let Some(image) = &request.image {
        content.push(json!({
            "type": "image_url",
            "image_url": {"url": image.data_url()}
        }));
    }
    json!({"role": "user", "content": content})
}

pub(crate) fn extract_chat_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}
