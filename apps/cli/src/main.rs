use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};

use prism_core_sdk::prelude::*;

/**
 * \brief CLI 程序入口：一次提示词，多家 Provider 并排对比。
 */
#[derive(Parser, Debug)]
#[command(name = "prism", version, about = "Fan one prompt out to several AI providers")]
struct Cli {
    /** \brief 将日志写入 logs/prism.log 而不是 stderr */
    #[arg(long, global = true, default_value_t = false)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 列出内置 Provider 与模型。
     */
    Providers,

    /**
     * \brief 向所有已配置 Key 的 Provider 发送同一提示词并逐个显示结果。
     */
    Compare(CompareArgs),

    /**
     * \brief 启动本地 HTTP 服务。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[arg(long)]
    prompt: String,
    /** \brief 附带的图片文件 */
    #[arg(long)]
    image: Option<PathBuf>,
    /** \brief 只启用这些 Provider（可重复） */
    #[arg(long = "only")]
    only: Vec<ProviderId>,
    /** \brief 覆盖模型选择，形如 `fireworks=accounts/fireworks/models/...` */
    #[arg(long = "model", value_parser = parse_model_override)]
    models: Vec<(ProviderId, String)>,
    /** \brief 保存 data URL 形式图片的目录 */
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, default_value = "")]
    gemini_key: String,
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, default_value = "")]
    openrouter_key: String,
    #[arg(long, env = "NOVITA_API_KEY", hide_env_values = true, default_value = "")]
    novita_key: String,
    #[arg(long, env = "FIREWORKS_API_KEY", hide_env_values = true, default_value = "")]
    fireworks_key: String,
}

fn parse_model_override(raw: &str) -> Result<(ProviderId, String)> {
    let (provider, model) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected PROVIDER=MODEL, got {}", raw))?;
    let provider: ProviderId = provider.parse()?;
    registry::resolve_model(provider, model)?;
    Ok((provider, model.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&telemetry::TelemetryOptions {
        log_file: cli.log_file,
    })
    .context("init logging failed")?;

    match cli.command {
        Commands::Providers => print_providers(),
        Commands::Compare(args) => {
            let settings = Settings::from_env().context("load settings failed")?;
            compare(args, settings).await?;
        }
        Commands::Serve { addr } => {
            let settings = Settings::from_env().context("load settings failed")?;
            let dispatcher = Dispatcher::new(settings).context("build http client failed")?;
            server::run(&addr, dispatcher).await?;
        }
    }

    Ok(())
}

fn print_providers() {
    for provider in registry::providers() {
        println!(
            "{} ({}){}",
            provider.name,
            provider.id,
            if provider.supports_vision { " [vision]" } else { "" }
        );
        for model in provider.models {
            println!(
                "  - {:<58} {:?}{}",
                model.id,
                model.kind,
                if model.accepts_image { ", reads images" } else { "" }
            );
        }
    }
}

fn build_configs(args: &CompareArgs) -> ProviderConfigs {
    let mut configs = registry::default_configs();
    for (id, cfg) in configs.iter_mut() {
        cfg.api_key = match id {
            ProviderId::Gemini => args.gemini_key.clone(),
            ProviderId::OpenRouter => args.openrouter_key.clone(),
            ProviderId::Novita => args.novita_key.clone(),
            ProviderId::Fireworks => args.fireworks_key.clone(),
        };
        if !args.only.is_empty() {
            cfg.enabled = args.only.contains(id);
        }
    }
    for (id, model) in &args.models {
        if let Some(cfg) = configs.get_mut(id) {
            cfg.model = model.clone();
        }
    }
    configs
}

fn load_image(path: &Path) -> Result<ImageInput> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image {} failed", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(ImageInput::from_bytes(bytes, mime))
}

async fn compare(args: CompareArgs, settings: Settings) -> Result<()> {
    let mut request = CompareRequest::new(args.prompt.clone());
    if let Some(path) = &args.image {
        request = request.with_image(load_image(path)?);
    }
    let configs = build_configs(&args);

    if request.has_image() {
        for id in eligible_providers(&configs) {
            let compatible = registry::compatible_models(id, true);
            if !compatible.iter().any(|m| m.id == configs[&id].model) {
                eprintln!(
                    "warning: {} model {} cannot read the attached image",
                    registry::provider(id).name,
                    configs[&id].model
                );
            }
        }
    }

    let dispatcher = Dispatcher::new(settings).context("build http client failed")?;
    let updates = match dispatcher.dispatch_all(request, &configs) {
        Ok(updates) => updates,
        Err(e) => bail!("{}", e),
    };

    let mut board = ResponseBoard::new();
    let out_dir = args.out_dir.clone();
    board
        .collect(updates, |update| {
            let name = registry::provider(update.provider).name;
            match &update.state {
                ResponseState::Idle => {}
                ResponseState::Loading => println!("[{}] loading...", name),
                ResponseState::Success(reply) => {
                    println!("\n=== {} ===", name);
                    print_reply(update.provider, reply, out_dir.as_deref());
                }
                ResponseState::Failure { message } => {
                    println!("\n=== {} ===\nError: {}", name, message);
                }
            }
        })
        .await;

    let failed = board.iter().filter(|(_, s)| s.error().is_some()).count();
    let succeeded = board
        .iter()
        .filter(|(_, s)| matches!(s, ResponseState::Success(_)))
        .count();
    println!("\n{} succeeded, {} failed", succeeded, failed);
    Ok(())
}

fn print_reply(provider: ProviderId, reply: &Reply, out_dir: Option<&Path>) {
    match reply {
        Reply::Text { text, citations } => {
            println!("{}", text);
            if !citations.is_empty() {
                println!("\nSources:");
                for (i, cite) in citations.iter().enumerate() {
                    println!("  [{}] {} - {}", i + 1, cite.title, cite.uri);
                }
            }
        }
        Reply::Image { url } => match (out_dir, url.strip_prefix("data:")) {
            (Some(dir), Some(_)) => match save_data_url(dir, provider, url) {
                Ok(path) => println!("Image saved to {}", path.display()),
                Err(e) => println!("Image (not saved: {:#})", e),
            },
            (_, Some(_)) => println!("Image: inline data ({} bytes encoded)", url.len()),
            (_, None) => println!("Image: {}", url),
        },
    }
}

fn save_data_url(dir: &Path, provider: ProviderId, url: &str) -> Result<PathBuf> {
    let (head, data) = url
        .split_once(',')
        .ok_or_else(|| anyhow!("not a data URL"))?;
    let ext = head
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split(';').next())
        .unwrap_or("png");
    let bytes = STANDARD.decode(data).context("decode image data failed")?;
    std::fs::create_dir_all(dir).context("create output directory failed")?;
    let path = dir.join(format!("{}.{}", provider, ext));
    std::fs::write(&path, bytes).with_context(|| format!("write {} failed", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(only: Vec<ProviderId>) -> CompareArgs {
        CompareArgs {
            prompt: "hi".into(),
            image: None,
            only,
            models: vec![(ProviderId::Fireworks, "accounts/fireworks/models/stable-diffusion-xl-base-1.0".into())],
            out_dir: None,
            gemini_key: "g".into(),
            openrouter_key: String::new(),
            novita_key: "n".into(),
            fireworks_key: "f".into(),
        }
    }

    #[test]
    fn test_build_configs_applies_keys_filters_and_models() {
        let cfgs = build_configs(&args(vec![]));
        assert_eq!(
            eligible_providers(&cfgs),
            vec![ProviderId::Gemini, ProviderId::Novita, ProviderId::Fireworks]
        );
        assert_eq!(
            cfgs[&ProviderId::Fireworks].model,
            "accounts/fireworks/models/stable-diffusion-xl-base-1.0"
        );

        let cfgs = build_configs(&args(vec![ProviderId::Novita]));
        assert_eq!(eligible_providers(&cfgs), vec![ProviderId::Novita]);
    }

    #[test]
    fn test_parse_model_override() {
        let (id, model) = parse_model_override("openrouter=google/gemma-7b-it:free").unwrap();
        assert_eq!(id, ProviderId::OpenRouter);
        assert_eq!(model, "google/gemma-7b-it:free");
        assert!(parse_model_override("openrouter").is_err());
        assert!(parse_model_override("novita=gpt-4o").is_err());
    }

    #[test]
    fn test_cli_parses_compare() {
        let cli = Cli::try_parse_from([
            "prism",
            "compare",
            "--prompt",
            "What is Rust?",
            "--only",
            "gemini",
            "--gemini-key",
            "k",
        ])
        .unwrap();
        match cli.command {
            Commands::Compare(a) => {
                assert_eq!(a.only, vec![ProviderId::Gemini]);
                assert_eq!(a.gemini_key, "k");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
