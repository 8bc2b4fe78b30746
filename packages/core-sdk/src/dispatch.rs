use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_stream::stream;
use futures_util::stream::{FuturesUnordered, Stream, StreamExt};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{AdapterError, DispatchError};
use crate::llm::{self, Invocation};
use crate::models::{
    CompareRequest, ProviderConfigs, ProviderId, Reply, ResponseState, StateUpdate,
};

pub type UpdateStream = Pin<Box<dyn Stream<Item = StateUpdate> + Send>>;

/**
 * \brief 派发给单个 Provider 的任务，自身持有全部数据。
 */
#[derive(Debug, Clone)]
pub struct Job {
    pub credential: String,
    pub model_id: String,
    pub request: Arc<CompareRequest>,
}

/**
 * \brief 可参与本次提交的 Provider：已启用且 Key 非空，按注册表顺序。
 */
pub fn eligible_providers(configs: &ProviderConfigs) -> Vec<ProviderId> {
    ProviderId::ALL
        .into_iter()
        .filter(|id| configs.get(id).map(|c| c.is_eligible()).unwrap_or(false))
        .collect()
}

/**
 * \brief 扇出核心：对每个合格 Provider 调用 `invoke`，并把状态变化以流的形式逐条给出。
 * \details 无合格 Provider 时直接返回校验错误，不产生任何状态变化。
 *          流依次给出：未派发 Provider 的 Idle、已派发 Provider 的 Loading、
 *          然后按完成先后给出各自的 Success / Failure。所有调用在同一个任务内
 *          并发推进，某一方失败不会中断其他调用。
 */
pub fn dispatch_with<F, Fut>(
    request: CompareRequest,
    configs: &ProviderConfigs,
    invoke: F,
) -> Result<UpdateStream, DispatchError>
where
    F: Fn(ProviderId, Job) -> Fut,
    Fut: Future<Output = Result<Reply, AdapterError>> + Send + 'static,
{
    let dispatched = eligible_providers(configs);
    if dispatched.is_empty() {
        return Err(DispatchError::NoEligibleProviders);
    }
    let idle: Vec<ProviderId> = ProviderId::ALL
        .into_iter()
        .filter(|id| !dispatched.contains(id))
        .collect();

    let request = Arc::new(request);
    let pending = FuturesUnordered::new();
    for id in &dispatched {
        let id = *id;
        let Some(cfg) = configs.get(&id) else {
            continue;
        };
        let job = Job {
            credential: cfg.api_key.trim().to_string(),
            model_id: cfg.model.clone(),
            request: request.clone(),
        };
        let fut = invoke(id, job);
        pending.push(async move { (id, fut.await) });
    }

    let out = stream! {
        let mut pending = pending;
        for id in idle {
            yield StateUpdate::new(id, ResponseState::Idle);
        }
        for id in dispatched {
            yield StateUpdate::new(id, ResponseState::Loading);
        }
        while let Some((id, outcome)) = pending.next().await {
            let state = match outcome {
                Ok(reply) => ResponseState::Success(reply),
                Err(e) => ResponseState::failure(e.to_string()),
            };
            yield StateUpdate::new(id, state);
        }
    };
    Ok(Box::pin(out))
}

/**
 * \brief 绑定真实适配器的派发器。
 */
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    settings: Arc<Settings>,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: Settings) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /**
     * \brief 对全部合格 Provider 发起调用，返回逐条状态更新。
     */
    pub fn dispatch_all(
        &self,
        request: CompareRequest,
        configs: &ProviderConfigs,
    ) -> Result<UpdateStream, DispatchError> {
        info!(
            prompt_len = request.prompt.len(),
            image = request.has_image(),
            "dispatching compare request"
        );
        dispatch_with(request, configs, |provider, job| {
            let client = self.client.clone();
            let settings = self.settings.clone();
            async move {
                let outcome = llm::invoke(
                    &client,
                    &settings,
                    provider,
                    Invocation {
                        credential: &job.credential,
                        model_id: &job.model_id,
                        request: &job.request,
                    },
                )
                .await;
                match &outcome {
                    Ok(_) => info!(provider = %provider, model = %job.model_id, "provider settled"),
                    Err(e) => {
                        warn!(provider = %provider, model = %job.model_id, error = %e, "provider failed")
                    }
                }
                outcome
            }
        })
    }
}

/**
 * \brief 按 Provider 分槽的状态存储；`apply` 是唯一的写入入口，每次只改一个槽位。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBoard {
    slots: BTreeMap<ProviderId, ResponseState>,
}

impl Default for ResponseBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBoard {
    pub fn new() -> Self {
        Self {
            slots: ProviderId::ALL
                .into_iter()
                .map(|id| (id, ResponseState::Idle))
                .collect(),
        }
    }

    pub fn apply(&mut self, update: StateUpdate) {
        self.slots.insert(update.provider, update.state);
    }

    pub fn get(&self, id: ProviderId) -> &ResponseState {
        self.slots.get(&id).unwrap_or(&ResponseState::Idle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderId, &ResponseState)> {
        self.slots.iter().map(|(id, s)| (*id, s))
    }

    /** \brief 没有任何槽位处于 Loading。 */
    pub fn all_settled(&self) -> bool {
        !self.slots.values().any(|s| s.is_loading())
    }

    /**
     * \brief 消费整条更新流写入存储，每条更新先交给 `observe`。
     */
    pub async fn collect<S, F>(&mut self, mut updates: S, mut observe: F)
    where
        S: Stream<Item = StateUpdate> + Unpin,
        F: FnMut(&StateUpdate),
    {
        while let Some(update) = updates.next().await {
            observe(&update);
            self.apply(update);
        }
    }
}
