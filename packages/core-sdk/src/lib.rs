pub mod config;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod models;
pub mod registry;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::{Endpoints, NovitaMode, PollPolicy, Settings};
    pub use crate::dispatch::{dispatch_with, eligible_providers, Dispatcher, ResponseBoard};
    pub use crate::error::{AdapterError, DispatchError};
    pub use crate::models::{
        Citation, CompareRequest, ImageInput, ModelKind, ProviderConfig, ProviderConfigs,
        ProviderId, Reply, ResponseState, StateUpdate,
    };
    pub use crate::{llm, registry, server, telemetry};
}
