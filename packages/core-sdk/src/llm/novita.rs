use std::future::Future;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::{ensure_success, post_bearer, read_json, Call};
use crate::config::{NovitaMode, PollPolicy};
use crate::error::AdapterError;
use crate::models::Reply;

const PROVIDER: &str = "Novita";
const LABEL: &str = "Novita Error";

/**
 * \brief 单次查询得到的任务状态。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /** \brief 排队或生成中，继续轮询 */
    Pending(String),
    /** \brief 完成，附带图片地址（可能为空） */
    Succeeded(Vec<String>),
    /** \brief 显式失败 */
    Failed(Option<String>),
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    task: TaskBody,
}

#[derive(Debug, Deserialize)]
struct TaskBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    images: Vec<NovitaImage>,
    #[serde(default)]
    failed_reason: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NovitaImage {
    Url(String),
    Object {
        #[serde(default)]
        image_url: Option<String>,
        #[serde(default)]
        image_file: Option<String>,
        #[serde(default)]
        image_type: Option<String>,
    },
}

impl NovitaImage {
    fn into_url(self) -> Option<String> {
        match self {
            NovitaImage::Url(url) => Some(url),
            NovitaImage::Object {
                image_url: Some(url),
                ..
            } if !url.is_empty() => Some(url),
            NovitaImage::Object {
                image_file: Some(data),
                image_type,
                ..
            } if !data.is_empty() => Some(format!(
                "data:image/{};base64,{}",
                image_type.as_deref().unwrap_or("png"),
                data
            )),
            NovitaImage::Object { .. } => None,
        }
    }
}

impl TaskBody {
    fn into_status(self) -> TaskStatus {
        let normalized = self.status.trim().to_ascii_uppercase();
        let normalized = normalized
            .strip_prefix("TASK_STATUS_")
            .unwrap_or(&normalized)
            .to_string();
        match normalized.as_str() {
            "SUCCESS" | "SUCCEED" | "SUCCEEDED" => TaskStatus::Succeeded(
                self.images
                    .into_iter()
                    .filter_map(NovitaImage::into_url)
                    .collect(),
            ),
            "FAILED" | "FAIL" => TaskStatus::Failed(
                self.failed_reason
                    .or(self.reason)
                    .filter(|r| !r.trim().is_empty()),
            ),
            _ => TaskStatus::Pending(normalized),
        }
    }
}

fn novita_reason(v: &Value) -> Option<String> {
    v.get("reason")
        .and_then(|r| r.as_str())
        .or_else(|| v.get("message").and_then(|m| m.as_str()))
        .map(|s| s.to_string())
}

fn generation_body(call: &Call<'_>) -> Value {
    json!({
        "model_name": call.model.id,
        "prompt": call.request.prompt,
        "negative_prompt": "",
        "width": 1024,
        "height": 1024,
        "n_iter": 1,
    })
}

/**
 * \brief Novita 文生图；按配置走同步接口或"提交 + 轮询"。
 */
pub(crate) async fn generate(call: &Call<'_>) -> Result<Reply, AdapterError> {
    match call.settings.novita_mode {
        NovitaMode::Sync => generate_sync(call).await,
        NovitaMode::Async => generate_async(call).await,
    }
}

async fn generate_sync(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let url = format!(
        "{}/v3/text-to-image",
        call.settings.endpoints.novita.trim_end_matches('/')
    );
    let resp = post_bearer(call.client, &url, call.credential, &generation_body(call)).await?;
    let resp = ensure_success(resp, LABEL, novita_reason).await?;
    let v = read_json(resp).await?;
    let images: Vec<NovitaImage> = v
        .get("images")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| AdapterError::Malformed(format!("unexpected Novita images: {}", e)))?
        .unwrap_or_default();
    images
        .into_iter()
        .find_map(NovitaImage::into_url)
        .map(Reply::image)
        .ok_or_else(|| AdapterError::Malformed("Novita API did not return any images.".into()))
}

async fn generate_async(call: &Call<'_>) -> Result<Reply, AdapterError> {
    let task_id = submit(call).await?;
    info!(task_id = %task_id, model = call.model.id, "novita task submitted");

    let base = call.settings.endpoints.novita.trim_end_matches('/').to_string();
    let url = format!("{}/v3/async/tasks/{}", base, task_id);
    let client = call.client;
    let credential = call.credential;
    let url = url.as_str();

    let image = poll_task(&task_id, &call.settings.poll, || async move {
        fetch_status(client, url, credential).await
    })
    .await?;
    Ok(Reply::image(image))
}

async fn submit(call: &Call<'_>) -> Result<String, AdapterError> {
    let url = format!(
        "{}/v3/async/text-to-image",
        call.settings.endpoints.novita.trim_end_matches('/')
    );
    let resp = post_bearer(call.client, &url, call.credential, &generation_body(call)).await?;
    let resp = ensure_success(resp, LABEL, novita_reason).await?;
    let reply: SubmitReply = resp.json().await?;
    reply
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AdapterError::Malformed("Novita API did not return a task id.".into()))
}

async fn fetch_status(
    client: &reqwest::Client,
    url: &str,
    credential: &str,
) -> Result<TaskStatus, AdapterError> {
    let resp = client
        .get(url)
        .header(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", credential),
        )
        .send()
        .await?;
    let resp = ensure_success(resp, LABEL, novita_reason).await?;
    let envelope: TaskEnvelope = resp.json().await?;
    Ok(envelope.task.into_status())
}

/**
 * \brief 轮询任务直至终态。
 * \details 每次查询前等待 `policy.interval`；单次查询失败只记录日志并继续；
 *          单次查询最多占用剩余预算，自开始起累计达到 `policy.budget`
 *          仍未终结则返回 `Timeout`，无论查询本身是否已返回。
 *          终态只有三种：图片、任务失败、超时。
 */
pub async fn poll_task<F, Fut>(
    task_id: &str,
    policy: &PollPolicy,
    mut fetch: F,
) -> Result<String, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TaskStatus, AdapterError>>,
{
    let started = Instant::now();
    let timed_out = || AdapterError::Timeout {
        provider: PROVIDER,
        task_id: task_id.to_string(),
        budget: policy.budget,
    };
    let mut attempt: u32 = 0;
    loop {
        sleep(policy.interval).await;
        attempt += 1;
        let remaining = policy.budget.saturating_sub(started.elapsed());
        let Ok(outcome) = timeout(remaining, fetch()).await else {
            warn!(task_id, attempt, "novita poll request outlived the budget");
            return Err(timed_out());
        };
        match outcome {
            Ok(TaskStatus::Succeeded(images)) => {
                return images.into_iter().next().ok_or_else(|| {
                    AdapterError::Malformed(format!(
                        "Novita task {} succeeded without an image",
                        task_id
                    ))
                });
            }
            Ok(TaskStatus::Failed(reason)) => {
                return Err(AdapterError::TaskFailed {
                    provider: PROVIDER,
                    reason: reason.unwrap_or_else(|| "Unknown".to_string()),
                });
            }
            Ok(TaskStatus::Pending(status)) => {
                debug!(task_id, attempt, status = %status, "novita task pending");
            }
            Err(e) => {
                warn!(task_id, attempt, error = %e, "novita poll attempt failed, continuing");
            }
        }
        if started.elapsed() >= policy.budget {
            return Err(timed_out());
        }
    }
}
