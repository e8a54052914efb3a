use anyhow::{Result, anyhow};
use parado_config::{
    CliOverrides, EnvConfig, ProviderSetting, SessionDefaults, load_file_config,
    resolve_session_defaults,
};
use parado_core::{BufferStore, Session, SessionOptions};
use parado_engine::{
    BoaInterpreter, BootPolicy, DirPackageSource, HttpPackageSource, PackageSource,
    boot_interpreter,
};
use parado_llm::{ModelClient, ModelReply, ModelRequest, ProviderRouter, ProviderSelection};
use parado_llm_gemini::GeminiClient;
use parado_llm_openai::OpenAiCompatibleClient;
use std::path::PathBuf;

pub(crate) struct MaybeGeminiClient {
    inner: Option<GeminiClient>,
}

impl ModelClient for MaybeGeminiClient {
    fn complete(&self, req: &ModelRequest, model: &str) -> Result<ModelReply> {
        let client = self
            .inner
            .as_ref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is required for Gemini requests"))?;
        client.complete(req, model)
    }

    fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

pub(crate) struct MaybeOpenAiClient {
    inner: Option<OpenAiCompatibleClient>,
}

impl ModelClient for MaybeOpenAiClient {
    fn complete(&self, req: &ModelRequest, model: &str) -> Result<ModelReply> {
        let client = self.inner.as_ref().ok_or_else(|| {
            anyhow!("OPENAI_API_KEY is required for OpenAI-compatible requests")
        })?;
        client.complete(req, model)
    }

    fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

pub(crate) type ParadoRouter = ProviderRouter<MaybeGeminiClient, MaybeOpenAiClient>;

pub(crate) fn provider_to_selection(provider: ProviderSetting) -> ProviderSelection {
    match provider {
        ProviderSetting::Auto => ProviderSelection::Auto,
        ProviderSetting::Gemini => ProviderSelection::Gemini,
        ProviderSetting::Openai => ProviderSelection::OpenAiCompatible,
    }
}

pub(crate) fn resolve_config(
    config: Option<PathBuf>,
    cli_overrides: &CliOverrides,
) -> Result<SessionDefaults> {
    let cwd = std::env::current_dir()?;
    let file_cfg = load_file_config(config.as_deref(), &cwd)?;
    let env_cfg = EnvConfig::from_current_env();
    Ok(resolve_session_defaults(
        cli_overrides,
        &env_cfg,
        file_cfg.as_ref(),
    ))
}

pub(crate) fn build_model_service(resolved: &SessionDefaults) -> ParadoRouter {
    let gemini = MaybeGeminiClient {
        inner: resolved
            .gemini_api_key
            .clone()
            .map(|api_key| GeminiClient::from_parts(resolved.gemini_base_url.clone(), api_key)),
    };
    let openai = MaybeOpenAiClient {
        inner: resolved.openai_api_key.clone().map(|api_key| {
            OpenAiCompatibleClient::from_parts(resolved.openai_base_url.clone(), api_key)
        }),
    };

    ProviderRouter {
        gemini,
        openai,
        gemini_model: resolved.gemini_model.clone(),
        openai_model: resolved.openai_model.clone(),
    }
}

pub(crate) fn build_package_source(resolved: &SessionDefaults) -> Box<dyn PackageSource> {
    match resolved.package_dir.as_ref() {
        Some(dir) => Box::new(DirPackageSource::new(PathBuf::from(dir))),
        None => Box::new(HttpPackageSource::new(resolved.package_index.clone())),
    }
}

pub(crate) fn session_options(resolved: &SessionDefaults) -> SessionOptions {
    SessionOptions {
        provider_selection: provider_to_selection(resolved.provider),
        // --model is already folded into the per-provider model names.
        model_override: None,
        temperature: resolved.temperature,
        max_agent_rounds: resolved.max_agent_rounds,
    }
}

/// Boots the configured interpreter with the preload packages installed.
///
/// Boot failures keep their `EngineError` so callers can offer a retry.
pub(crate) fn build_interpreter(
    resolved: &SessionDefaults,
    packages: &dyn PackageSource,
) -> Result<BoaInterpreter> {
    let selected = std::env::var("PARADO_ENGINE").unwrap_or_else(|_| "boa".to_string());
    match selected.trim().to_ascii_lowercase().as_str() {
        "boa" => {}
        other => return Err(anyhow!("unknown engine '{other}'. Supported: 'boa'")),
    }

    tracing::debug!(
        engine = "boa",
        preload = resolved.packages.len(),
        "booting interpreter"
    );
    let policy = BootPolicy {
        attempts: resolved.boot_attempts,
        ..BootPolicy::default()
    };
    Ok(boot_interpreter(
        BoaInterpreter::new,
        &resolved.packages,
        packages,
        &policy,
    )?)
}

pub(crate) fn assemble_session(
    resolved: &SessionDefaults,
    buffers: BufferStore,
    interpreter: BoaInterpreter,
    packages: Box<dyn PackageSource>,
) -> Session {
    Session::new(
        buffers,
        Box::new(interpreter),
        Box::new(build_model_service(resolved)),
        packages,
        session_options(resolved),
    )
    .with_installed(resolved.packages.iter().cloned())
}

pub(crate) fn build_session(resolved: &SessionDefaults, buffers: BufferStore) -> Result<Session> {
    let packages = build_package_source(resolved);
    let interpreter = build_interpreter(resolved, packages.as_ref())?;
    Ok(assemble_session(resolved, buffers, interpreter, packages))
}

#[cfg(test)]
mod tests {
    use super::{build_model_service, provider_to_selection, session_options};
    use parado_config::{ProviderSetting, SessionDefaults};
    use parado_llm::{ModelService, Provider, ProviderSelection};

    #[test]
    fn unconfigured_providers_are_left_out_of_the_chain() {
        let resolved = SessionDefaults {
            openai_api_key: Some("sk-test".to_string()),
            ..SessionDefaults::default()
        };
        let chain = build_model_service(&resolved).candidate_chain(ProviderSelection::Auto);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].provider, Provider::OpenAiCompatible);
        assert_eq!(chain[0].model, "gpt-4.1-mini");
    }

    #[test]
    fn options_follow_resolved_settings() {
        let resolved = SessionDefaults {
            provider: ProviderSetting::Gemini,
            temperature: 0.2,
            max_agent_rounds: 4,
            ..SessionDefaults::default()
        };
        let options = session_options(&resolved);
        assert_eq!(options.provider_selection, ProviderSelection::Gemini);
        assert_eq!(options.max_agent_rounds, 4);
        assert!(options.model_override.is_none());
        assert_eq!(
            provider_to_selection(ProviderSetting::Openai),
            ProviderSelection::OpenAiCompatible
        );
    }
}
