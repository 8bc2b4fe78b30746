use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::llm::gemini;

/**
 * \brief 判断一次 Gemini 请求是否附加联网检索工具的谓词：(prompt, has_image) -> bool。
 */
pub type GroundingPredicate = fn(&str, bool) -> bool;

/**
 * \brief 各 Provider 的 API 基地址。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gemini: String,
    pub openrouter: String,
    pub novita: String,
    pub fireworks: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gemini: "https://generativelanguage.googleapis.com".to_string(),
            openrouter: "https://openrouter.ai/api/v1".to_string(),
            novita: "https://api.novita.ai".to_string(),
            fireworks: "https://api.fireworks.ai".to_string(),
        }
    }
}

/**
 * \brief 异步任务轮询参数。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /** \brief 两次查询之间的等待 */
    pub interval: Duration,
    /** \brief 总时长预算，耗尽即超时 */
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            budget: Duration::from_secs(60),
        }
    }
}

/**
 * \brief Novita 文生图的调用方式。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NovitaMode {
    /** \brief 提交任务后轮询结果 */
    #[default]
    Async,
    /** \brief 单次请求直接返回图片 */
    Sync,
}

/**
 * \brief 适配层运行参数，不包含任何凭据。
 */
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub poll: PollPolicy,
    pub novita_mode: NovitaMode,
    pub grounding: GroundingPredicate,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            poll: PollPolicy::default(),
            novita_mode: NovitaMode::default(),
            grounding: gemini::knowledge_query,
        }
    }
}

impl Settings {
    /**
     * \brief 读取 `PRISM_*` 环境变量覆盖默认值。
     */
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let base = |key: &str, slot: &mut String| {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = v.trim().trim_end_matches('/').to_string();
            }
        };
        base("PRISM_GEMINI_BASE", &mut settings.endpoints.gemini);
        base("PRISM_OPENROUTER_BASE", &mut settings.endpoints.openrouter);
        base("PRISM_NOVITA_BASE", &mut settings.endpoints.novita);
        base("PRISM_FIREWORKS_BASE", &mut settings.endpoints.fireworks);

        if let Some(mode) = lookup("PRISM_NOVITA_MODE") {
            settings.novita_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "async" => NovitaMode::Async,
                "sync" => NovitaMode::Sync,
                other => return Err(anyhow!("PRISM_NOVITA_MODE must be async or sync, got {}", other)),
            };
        }
        if let Some(v) = lookup("PRISM_POLL_INTERVAL_SECS") {
            settings.poll.interval = parse_secs(&v).context("invalid PRISM_POLL_INTERVAL_SECS")?;
        }
        if let Some(v) = lookup("PRISM_POLL_BUDGET_SECS") {
            settings.poll.budget = parse_secs(&v).context("invalid PRISM_POLL_BUDGET_SECS")?;
        }
        Ok(settings)
    }
}

fn parse_secs(raw: &str) -> Result<Duration> {
    let secs: u64 = raw.trim().parse()?;
    if secs == 0 {
        return Err(anyhow!("must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}
