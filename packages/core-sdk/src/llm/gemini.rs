use serde_json::{json, Value};
use tracing::debug;

use super::{ensure_success, error_message, read_json, Call};
use crate::error::AdapterError;
use crate::models::{Citation, CompareRequest, Reply};

const LABEL: &str = "Gemini Error";

/**
 * \brief 触发联网检索的前缀（小写）。
 */
pub const GROUNDING_TRIGGERS: &[&str] = &["who is", "what is", "explain", "latest", "news about"];

/**
 * \brief 默认的检索判定：无图片且提示词以知识类前缀开头。
 * \details 只是启发式，可能误判；可通过 `Settings::grounding` 替换。
 */
pub fn knowledge_query(prompt: &str, has_image: bool) -> bool {
    if has_image {
        return false;
    }
    let lowered = prompt.to_lowercase();
    GROUNDING_TRIGGERS.iter().any(|t| lowered.starts_with(t))
}

/**
 * \brief 调用 generateContent，必要时附加 google_search 工具并收集引用。
 */
pub(crate) async fn generate(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let request = call.request;
    let grounded = (call.settings.grounding)(&request.prompt, request.has_image());
    let base = normalize_gemini_base(&call.settings.endpoints.gemini);
    let url = format!("{}/models/{}:generateContent", base, call.model.id);
    let body = request_body(request, grounded);
    debug!(model = call.model.id, grounded, "gemini request");

    let resp = call
        .client
        .post(url)
        .query(&[("key", call.credential)])
        .json(&body)
        .send()
        .await?;
    let resp = ensure_success(resp, LABEL, error_message).await?;
    let v = read_json(resp).await?;

    let text = extract_text(&v).ok_or_else(|| match block_reason(&v) {
        Some(reason) => AdapterError::Malformed(format!("Gemini blocked the prompt: {}", reason)),
        None => AdapterError::Malformed("Gemini returned no text".into()),
    })?;
    Ok(Reply::Text {
        text,
        citations: extract_citations(&v),
    })
}

pub(crate) fn request_body(request: &CompareRequest, grounded: bool) -> Value {
    let mut parts = vec![json!({"text": request.prompt})];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inline_data": {"mime_type": image.mime_type, "data": image.base64}
        }));
    }
    let mut body = json!({
        "contents": [{"role": "user", "parts": parts}],
    });
    if grounded {
        body["tools"] = json!([{"google_search": {}}]);
    }
    body
}

fn extract_text(v: &Value) -> Option<String> {
    let parts = v.pointer("/candidates/0/content/parts")?.as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(""))
    }
}

fn block_reason(v: &Value) -> Option<String> {
    v.pointer("/promptFeedback/blockReason")
        .or_else(|| v.pointer("/candidates/0/finishReason"))
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
}

/**
 * \brief 按返回顺序收集 web 引用，不去重；缺标题时用 uri 代替。
 */
fn extract_citations(v: &Value) -> Vec<Citation> {
    v.pointer("/candidates/0/groundingMetadata/groundingChunks")
        .and_then(|c| c.as_array())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| chunk.get("web"))
                .filter_map(|web| {
                    let uri = web.get("uri").and_then(|u| u.as_str())?;
                    if uri.is_empty() {
                        return None;
                    }
                    let title = web
                        .get("title")
                        .and_then(|t| t.as_str())
                        .filter(|t| !t.is_empty())
                        .unwrap_or(uri);
                    Some(Citation {
                        uri: uri.to_string(),
                        title: title.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_gemini_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageInput;

    #[test]
    fn test_knowledge_query_triggers() {
        assert!(knowledge_query("What is quantum entanglement?", false));
        assert!(knowledge_query("Explain borrowing", false));
        assert!(!knowledge_query("  explain borrowing", false));
        assert!(knowledge_query("NEWS ABOUT rust 2024", false));
        assert!(!knowledge_query("Draw a cat", false));
        assert!(!knowledge_query("Tell me what is new", false));
        assert!(!knowledge_query("What is in this picture?", true));
    }

    #[test]
    fn test_request_body_grounding_path() {
        let grounded = CompareRequest::new("What is quantum entanglement?");
        let body = request_body(&grounded, knowledge_query(&grounded.prompt, false));
        assert_eq!(body["tools"], json!([{"google_search": {}}]));

        let plain = CompareRequest::new("Draw a cat");
        let body = request_body(&plain, knowledge_query(&plain.prompt, false));
        assert!(body.get("tools").is_none());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Draw a cat");
    }

    #[test]
    fn test_request_body_inlines_image() {
        let req = CompareRequest::new("what is this")
            .with_image(ImageInput::from_bytes(vec![1, 2, 3], "image/png"));
        let body = request_body(&req, false);
        assert_eq!(
            body["contents"][0]["parts"][1]["inline_data"],
            json!({"mime_type": "image/png", "data": "AQID"})
        );
    }

    #[test]
    fn test_extract_text_and_citations() {
        let v = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://a.example", "title": "A"}},
                    {"web": {"uri": ""}},
                    {"retrievedContext": {}},
                    {"web": {"uri": "https://b.example"}},
                    {"web": {"uri": "https://a.example", "title": "A"}}
                ]}
            }]
        });
        assert_eq!(extract_text(&v).as_deref(), Some("Hello world"));
        let cites = extract_citations(&v);
        assert_eq!(cites.len(), 3);
        assert_eq!(cites[0].title, "A");
        assert_eq!(cites[1].title, "https://b.example");
        assert_eq!(cites[2].uri, "https://a.example");
    }

    #[test]
    fn test_block_reason_reported() {
        let v = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(extract_text(&v).is_none());
        assert_eq!(block_reason(&v).as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_normalize_gemini_base() {
        assert_eq!(
            normalize_gemini_base("https://generativelanguage.googleapis.com/"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(normalize_gemini_base("http://x/v1"), "http://x/v1");
    }
}
