use crate::error::AdapterError;
use crate::models::{Model, ModelKind, Provider, ProviderConfig, ProviderConfigs, ProviderId};

const GEMINI_MODELS: &[Model] = &[Model {
    id: "gemini-2.5-flash-preview-04-17",
    name: "Gemini 2.5 Flash",
    kind: ModelKind::Text,
    accepts_image: true,
}];

const OPENROUTER_MODELS: &[Model] = &[
    Model {
        id: "google/gemini-flash-1.5",
        name: "Gemini Flash 1.5",
        kind: ModelKind::Text,
        accepts_image: true,
    },
    Model {
        id: "mistralai/mistral-7b-instruct:free",
        name: "Mistral 7B (Free)",
        kind: ModelKind::Text,
        accepts_image: false,
    },
    Model {
        id: "google/gemma-7b-it:free",
        name: "Gemma 7B (Free)",
        kind: ModelKind::Text,
        accepts_image: false,
    },
    Model {
        id: "nousresearch/nous-hermes-2-mixtral-8x7b-dpo",
        name: "Nous Hermes 2 Mixtral",
        kind: ModelKind::Text,
        accepts_image: false,
    },
];

const NOVITA_MODELS: &[Model] = &[
    Model {
        id: "sd_xl_base_1.0_url.json",
        name: "Stable Diffusion XL 1.0",
        kind: ModelKind::Image,
        accepts_image: false,
    },
    Model {
        id: "dall-e-3_url.json",
        name: "DALL-E 3",
        kind: ModelKind::Image,
        accepts_image: false,
    },
    Model {
        id: "Unstable_Diffusers_v10_url.json",
        name: "Unstable Diffusers v10",
        kind: ModelKind::Image,
        accepts_image: false,
    },
];

const FIREWORKS_MODELS: &[Model] = &[
    Model {
        id: "accounts/fireworks/models/firellava-13b",
        name: "FireLLaVA 13B (Vision)",
        kind: ModelKind::Text,
        accepts_image: true,
    },
    Model {
        id: "accounts/fireworks/models/mixtral-8x7b-instruct",
        name: "Mixtral 8x7B Instruct",
        kind: ModelKind::Text,
        accepts_image: false,
    },
    Model {
        id: "accounts/fireworks/models/stable-diffusion-xl-base-1.0",
        name: "Stable Diffusion XL",
        kind: ModelKind::Image,
        accepts_image: false,
    },
];

static PROVIDERS: [Provider; 4] = [
    Provider {
        id: ProviderId::Gemini,
        name: "Google Gemini",
        supports_vision: true,
        models: GEMINI_MODELS,
    },
    Provider {
        id: ProviderId::OpenRouter,
        name: "OpenRouter",
        supports_vision: true,
        models: OPENROUTER_MODELS,
    },
    Provider {
        id: ProviderId::Novita,
        name: "Novita AI",
        supports_vision: false,
        models: NOVITA_MODELS,
    },
    Provider {
        id: ProviderId::Fireworks,
        name: "Fireworks AI",
        supports_vision: true,
        models: FIREWORKS_MODELS,
    },
];

/**
 * \brief 全部 Provider，按展示顺序。
 */
pub fn providers() -> &'static [Provider] {
    &PROVIDERS
}

pub fn provider(id: ProviderId) -> &'static Provider {
    match id {
        ProviderId::Gemini => &PROVIDERS[0],
        ProviderId::OpenRouter => &PROVIDERS[1],
        ProviderId::Novita => &PROVIDERS[2],
        ProviderId::Fireworks => &PROVIDERS[3],
    }
}

pub fn find_model(id: ProviderId, model_id: &str) -> Option<&'static Model> {
    provider(id).models.iter().find(|m| m.id == model_id)
}

/**
 * \brief 校验模型属于该 Provider，否则返回 `UnknownModel`。
 */
pub fn resolve_model(id: ProviderId, model_id: &str) -> Result<&'static Model, AdapterError> {
    find_model(id, model_id).ok_or_else(|| AdapterError::UnknownModel {
        provider: provider(id).name,
        model: model_id.to_string(),
    })
}

/**
 * \brief 可选模型列表：附带图片时只保留能读图的模型。
 */
pub fn compatible_models(id: ProviderId, has_image: bool) -> Vec<&'static Model> {
    let p = provider(id);
    if !has_image {
        return p.models.iter().collect();
    }
    if !p.supports_vision {
        return Vec::new();
    }
    p.models.iter().filter(|m| m.accepts_image).collect()
}

/**
 * \brief 会话初始配置：全部启用、Key 为空、选中第一个模型。
 */
pub fn default_configs() -> ProviderConfigs {
    PROVIDERS
        .iter()
        .map(|p| {
            (
                p.id,
                ProviderConfig {
                    enabled: true,
                    api_key: String::new(),
                    model: p.models[0].id.to_string(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_matches_ids() {
        for id in ProviderId::ALL {
            assert_eq!(provider(id).id, id);
            assert!(!provider(id).models.is_empty());
        }
        let ids: Vec<_> = providers().iter().map(|p| p.id).collect();
        assert_eq!(ids, ProviderId::ALL.to_vec());
    }

    #[test]
    fn test_resolve_model_rejects_foreign_model() {
        assert!(resolve_model(ProviderId::Novita, "dall-e-3_url.json").is_ok());
        let err = resolve_model(ProviderId::Fireworks, "dall-e-3_url.json").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model dall-e-3_url.json not found for Fireworks AI"
        );
    }

    #[test]
    fn test_compatible_models_with_image() {
        assert_eq!(compatible_models(ProviderId::OpenRouter, false).len(), 4);
        let vision: Vec<_> = compatible_models(ProviderId::OpenRouter, true)
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(vision, vec!["google/gemini-flash-1.5"]);
        assert!(compatible_models(ProviderId::Novita, true).is_empty());
        let fw: Vec<_> = compatible_models(ProviderId::Fireworks, true)
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(fw, vec!["accounts/fireworks/models/firellava-13b"]);
    }

    #[test]
    fn test_default_configs_select_first_model() {
        let cfgs = default_configs();
        assert_eq!(cfgs.len(), 4);
        for (id, cfg) in &cfgs {
            assert!(cfg.enabled);
            assert!(cfg.api_key.is_empty());
            assert_eq!(cfg.model, provider(*id).models[0].id);
        }
    }
}
