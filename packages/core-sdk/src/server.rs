use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::models::{CompareRequest, ImageInput, Provider, ProviderConfigs};
use crate::registry;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/**
 * \brief 启动本地 HTTP 服务。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, dispatcher: Dispatcher) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}

pub fn router(dispatcher: Dispatcher) -> Router {
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
    };
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/providers", get(get_providers))
        .route("/api/compare", post(compare))
        .with_state(state)
}

#[derive(Serialize, Debug)]
struct ProvidersResponse {
    providers: &'static [Provider],
    defaults: ProviderConfigs,
}

#[derive(Deserialize, Debug)]
struct ImagePayload {
    /** \brief base64，可带 data URL 前缀 */
    data: String,
    #[serde(default = "default_mime")]
    mime_type: String,
}

fn default_mime() -> String {
    "image/jpeg".to_string()
}

#[derive(Deserialize, Debug)]
struct CompareBody {
    prompt: String,
    #[serde(default)]
    image: Option<ImagePayload>,
    #[serde(default)]
    providers: ProviderConfigs,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

/**
 * \brief 注册表与初始配置。
 */
async fn get_providers() -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: registry::providers(),
        defaults: registry::default_configs(),
    })
}

/**
 * \brief 对比接口：POST /api/compare，以 SSE 推送每个 Provider 的状态变化，最后发送 done。
 */
async fn compare(
    State(state): State<AppState>,
    Json(body): Json<CompareBody>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)>
{
    let mut request = CompareRequest::new(body.prompt);
    if let Some(image) = body.image {
        let image = ImageInput::from_base64(&image.data, image.mime_type).map_err(bad_request)?;
        request = request.with_image(image);
    }

    let mut updates = state
        .dispatcher
        .dispatch_all(request, &body.providers)
        .map_err(bad_request)?;

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();
    tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            match Event::default().event("state").json_data(&update) {
                Ok(event) => {
                    if tx.send(Ok(event)).is_err() {
                        // 客户端断开后仍让调用跑完，只是不再推送
                        continue;
                    }
                }
                Err(e) => warn!("encode state event failed: {}", e),
            }
        }
        let _ = tx.send(Ok(Event::default().event("done").data("{}")));
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::new()))
}

fn bad_request<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}
