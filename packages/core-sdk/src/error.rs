use std::time::Duration;

use thiserror::Error;

/**
 * \brief 单个 Provider 调用失败的原因；`Display` 即展示给用户的错误文本。
 */
#[derive(Debug, Error)]
pub enum AdapterError {
    /** \brief 请求无法发出或连接中断 */
    #[error("Network error: {0}")]
    Network(String),

    /** \brief 非 2xx 响应，附带 Provider 自己给出的原因 */
    #[error("{label}: {reason}")]
    Rejected { label: &'static str, reason: String },

    /** \brief 响应缺少预期字段 */
    #[error("{0}")]
    Malformed(String),

    /** \brief 异步任务显式失败 */
    #[error("{provider} task failed: {reason}")]
    TaskFailed {
        provider: &'static str,
        reason: String,
    },

    /** \brief 轮询预算耗尽 */
    #[error("{provider} task {task_id} timed out after {}s", .budget.as_secs())]
    Timeout {
        provider: &'static str,
        task_id: String,
        budget: Duration,
    },

    #[error("Model {model} not found for {provider}")]
    UnknownModel {
        provider: &'static str,
        model: String,
    },
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Malformed(format!("unexpected response body: {}", err))
        } else {
            AdapterError::Network(err.to_string())
        }
    }
}

/**
 * \brief 提交层面的校验错误，出现时不派发任何请求。
 */
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Please enable at least one provider and enter its API key.")]
    NoEligibleProviders,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_facing() {
        let e = AdapterError::Rejected {
            label: "OpenRouter Error",
            reason: "Invalid key".into(),
        };
        assert_eq!(e.to_string(), "OpenRouter Error: Invalid key");

        let e = AdapterError::Timeout {
            provider: "Novita",
            task_id: "t1".into(),
            budget: Duration::from_secs(60),
        };
        assert_eq!(e.to_string(), "Novita task t1 timed out after 60s");

        let e = AdapterError::TaskFailed {
            provider: "Novita",
            reason: "Unknown".into(),
        };
        assert_eq!(e.to_string(), "Novita task failed: Unknown");
    }
}
