use std::time::Duration;

use mockito::Server;
use prism_core_sdk::prelude::*;
use serde_json::json;

#[tokio::test]
async fn test_dispatch_all_settles_each_provider_independently() {
    let mut server = Server::new_async().await;
    let _chat = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": "Hello from OpenRouter"}}]}).to_string())
        .create_async()
        .await;
    let _image = server
        .mock(
            "POST",
            "/inference/v1/image_generation/accounts/fireworks/models/stable-diffusion-xl-base-1.0",
        )
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": {"message": "GPU pool exhausted"}}).to_string())
        .create_async()
        .await;

    let mut settings = Settings::default();
    settings.endpoints.openrouter = server.url();
    settings.endpoints.fireworks = server.url();
    settings.poll.interval = Duration::from_millis(10);
    let dispatcher = Dispatcher::new(settings).unwrap();

    let mut configs = registry::default_configs();
    configs.insert(
        ProviderId::OpenRouter,
        ProviderConfig::new("or-key", "mistralai/mistral-7b-instruct:free"),
    );
    configs.insert(
        ProviderId::Fireworks,
        ProviderConfig::new("fw-key", "accounts/fireworks/models/stable-diffusion-xl-base-1.0"),
    );
    // 启用但未填写 Key 的 Provider 不参与
    configs.get_mut(&ProviderId::Gemini).unwrap().enabled = true;

    let updates = dispatcher
        .dispatch_all(CompareRequest::new("Say hello"), &configs)
        .unwrap();
    let mut board = ResponseBoard::new();
    let mut log = Vec::new();
    board.collect(updates, |u| log.push(u.clone())).await;

    assert!(board.all_settled());
    assert_eq!(board.get(ProviderId::OpenRouter).text(), Some("Hello from OpenRouter"));
    assert_eq!(
        board.get(ProviderId::Fireworks).error(),
        Some("Fireworks Image Gen Error: GPU pool exhausted")
    );
    assert_eq!(board.get(ProviderId::Gemini), &ResponseState::Idle);
    assert_eq!(board.get(ProviderId::Novita), &ResponseState::Idle);

    let loading: Vec<_> = log
        .iter()
        .filter(|u| u.state.is_loading())
        .map(|u| u.provider)
        .collect();
    assert_eq!(loading, vec![ProviderId::OpenRouter, ProviderId::Fireworks]);
}

#[tokio::test]
async fn test_dispatch_all_unknown_model_fails_only_that_provider() {
    let mut server = Server::new_async().await;
    let _chat = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
        .create_async()
        .await;

    let mut settings = Settings::default();
    settings.endpoints.openrouter = server.url();
    let dispatcher = Dispatcher::new(settings).unwrap();

    let mut configs = ProviderConfigs::new();
    configs.insert(
        ProviderId::OpenRouter,
        ProviderConfig::new("k", "google/gemma-7b-it:free"),
    );
    configs.insert(ProviderId::Novita, ProviderConfig::new("k", "not-a-model"));

    let updates = dispatcher
        .dispatch_all(CompareRequest::new("hi"), &configs)
        .unwrap();
    let mut board = ResponseBoard::new();
    board.collect(updates, |_| {}).await;

    assert_eq!(board.get(ProviderId::OpenRouter).text(), Some("ok"));
    assert_eq!(
        board.get(ProviderId::Novita).error(),
        Some("Model not-a-model not found for Novita AI")
    );
}

#[test]
fn test_dispatch_all_without_keys_raises_validation() {
    let dispatcher = Dispatcher::new(Settings::default()).unwrap();
    let result = dispatcher.dispatch_all(CompareRequest::new("hi"), &registry::default_configs());
    assert_eq!(result.err(), Some(DispatchError::NoEligibleProviders));
}
