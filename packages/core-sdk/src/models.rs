use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/**
 * \brief Provider 标识，闭合集合，顺序即注册表顺序。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    OpenRouter,
    Novita,
    Fireworks,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Gemini,
        ProviderId::OpenRouter,
        ProviderId::Novita,
        ProviderId::Fireworks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Novita => "novita",
            ProviderId::Fireworks => "fireworks",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "openrouter" => Ok(ProviderId::OpenRouter),
            "novita" => Ok(ProviderId::Novita),
            "fireworks" => Ok(ProviderId::Fireworks),
            other => Err(anyhow!("unknown provider: {}", other)),
        }
    }
}

/**
 * \brief 模型输出形态。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelKind {
    Text,
    Image,
}

/**
 * \brief 模型描述（静态数据）。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Model {
    /** \brief Provider 侧的模型 ID */
    pub id: &'static str,
    /** \brief 显示名称 */
    pub name: &'static str,
    /** \brief 输出形态 */
    pub kind: ModelKind,
    /** \brief 是否可以读取附带的图片 */
    pub accepts_image: bool,
}

/**
 * \brief Provider 描述（静态数据）。
 */
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: &'static str,
    pub supports_vision: bool,
    pub models: &'static [Model],
}

/**
 * \brief 单个 Provider 的会话级配置，只存在于进程内存中。
 */
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /** \brief 是否参与对比 */
    #[serde(default)]
    pub enabled: bool,
    /** \brief API Key */
    #[serde(default)]
    pub api_key: String,
    /** \brief 选中的模型 ID */
    #[serde(default)]
    pub model: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /** \brief 已启用且填写了非空 Key。 */
    pub fn is_eligible(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("enabled", &self.enabled)
            .field(
                "api_key",
                &if self.api_key.is_empty() { "" } else { "<redacted>" },
            )
            .field("model", &self.model)
            .finish()
    }
}

pub type ProviderConfigs = BTreeMap<ProviderId, ProviderConfig>;

/**
 * \brief 附带的图片：原始字节与 base64 编码形式同时保留。
 */
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub base64: String,
    pub mime_type: String,
}

impl ImageInput {
    pub fn from_bytes(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let base64 = STANDARD.encode(&bytes);
        Self {
            bytes,
            base64,
            mime_type: mime_type.into(),
        }
    }

    /**
     * \brief 从 base64 构造；允许带 `data:...;base64,` 前缀，解码失败返回错误。
     */
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self> {
        let raw = match data.split_once(',') {
            Some((head, tail)) if head.starts_with("data:") => tail,
            _ => data,
        };
        let raw = raw.trim();
        let bytes = STANDARD
            .decode(raw)
            .map_err(|e| anyhow!("invalid base64 image: {}", e))?;
        Ok(Self {
            bytes,
            base64: raw.to_string(),
            mime_type: mime_type.into(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/**
 * \brief 一次"对比"提交的请求，派发后不可变。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub prompt: String,
    pub image: Option<ImageInput>,
}

impl CompareRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/**
 * \brief 联网检索返回的引用来源。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

/**
 * \brief 归一化后的成功结果。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        citations: Vec<Citation>,
    },
    Image {
        url: String,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text {
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Reply::Image { url: url.into() }
    }
}

/**
 * \brief 每个 Provider 在一次提交中的状态。
 * \details 变体本身保证 text / image_url / error 至多其一存在，Loading 时全部为空。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseState {
    #[default]
    Idle,
    Loading,
    Success(Reply),
    Failure {
        message: String,
    },
}

impl ResponseState {
    pub fn failure(message: impl Into<String>) -> Self {
        ResponseState::Failure {
            message: message.into(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ResponseState::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, ResponseState::Success(_) | ResponseState::Failure { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ResponseState::Success(Reply::Text { text, .. }) => Some(text),
            _ => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            ResponseState::Success(Reply::Image { url }) => Some(url),
            _ => None,
        }
    }

    pub fn citations(&self) -> &[Citation] {
        match self {
            ResponseState::Success(Reply::Text { citations, .. }) => citations,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ResponseState::Failure { message } => Some(message),
            _ => None,
        }
    }
}

/**
 * \brief 针对单个 Provider 槽位的状态更新消息。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateUpdate {
    pub provider: ProviderId,
    pub state: ResponseState,
}

impl StateUpdate {
    pub fn new(provider: ProviderId, state: ResponseState) -> Self {
        Self { provider, state }
    }
}
