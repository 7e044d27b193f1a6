use std::env;
use std::fmt::Display;

use config::Config;
use chrono::TimeDelta;
use config::ConfigError;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::mailing_list_client::MailingListClient;
use crate::mailing_list_client::ProviderCredentials;

/// Global configuration, layered from `configuration/base.yaml`,
/// `configuration/{environment}.yaml` and the process environment. See
/// `get_configuration`.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub mailing_list: MailingListSettings,
    pub deploy: DeploySettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// Server configuration
#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    /// localhost on a dev machine, 0.0.0.0 in a container
    pub host: String,

    /// 0 asks the OS for a random free port (used by the test suite)
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,

    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub log_level: String,
}

/// Everything needed to talk to the mailing-list provider.
///
/// `api_secret` and `form_id` are deliberately optional: a deployment without
/// them still starts, and every subscribe request answers with a configuration
/// error until they are provided.
#[derive(Deserialize, Clone, Debug)]
pub struct MailingListSettings {
    pub base_url: String,
    pub api_secret: Option<Secret<String>>,
    pub form_id: Option<String>,
    /// Form id exposed to the browser bundle; diagnostics only.
    pub public_form_id: Option<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub tag_cache_ttl_seconds: u64,
}

impl MailingListSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }

    /// Fails if the configured number of seconds does not fit a `TimeDelta`.
    pub fn tag_cache_ttl(&self) -> Result<TimeDelta, ConfigError> {
        i64::try_from(self.tag_cache_ttl_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                ConfigError::Message(format!(
                    "mailing_list.tag_cache_ttl_seconds is out of range: {}",
                    self.tag_cache_ttl_seconds
                ))
            })
    }

    pub fn client(&self) -> Result<MailingListClient, reqwest::Error> {
        MailingListClient::new(self.base_url.clone(), self.timeout())
    }

    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            api_secret: self.api_secret.clone(),
            form_id: self.form_id.clone(),
        }
    }

    /// Length of the configured secret, for diagnostics only.
    pub fn secret_length(&self) -> usize {
        self.api_secret
            .as_ref()
            .map(|s| s.expose_secret().len())
            .unwrap_or(0)
    }
}

/// Where the site is served from; drives the CORS allowed origin.
#[derive(Deserialize, Clone, Debug)]
pub struct DeploySettings {
    #[serde(default)]
    pub environment: Environment,
    pub production_origin: String,
    pub development_origin: String,
    /// Deploy preview URL (`DEPLOY_PRIME_URL` on Netlify)
    pub deploy_prime_url: Option<String>,
    /// Branch deploy URL (`DEPLOY_URL` on Netlify)
    pub deploy_url: Option<String>,
    /// Netlify deploy context (`CONTEXT`), e.g. `deploy-preview`; diagnostics only.
    pub context: Option<String>,
}

impl DeploySettings {
    /// Origin allowed to call the API from a browser. Deploy URLs win over the
    /// runtime environment, and anything unrecognised falls back to `*`.
    pub fn allowed_origin(&self) -> &str {
        if let Some(url) = non_empty(&self.deploy_prime_url) {
            return url;
        }
        if let Some(url) = non_empty(&self.deploy_url) {
            return url;
        }
        match &self.environment {
            Environment::Production => self.production_origin.as_str(),
            Environment::Development => self.development_origin.as_str(),
            Environment::Test | Environment::Other(_) => "*",
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct NotificationSettings {
    /// Receives a JSON notification for every successful signup, if set.
    pub webhook_url: Option<String>,
}

/// Runtime mode. Names other than the three known ones are accepted as
/// `Other`, which has no environment file of its own.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
    Other(String),
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
            Environment::Other(name) => name.as_str(),
        };
        write!(f, "{name}")
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" | "local" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            "" => Err("APP_ENVIRONMENT must not be empty".to_string()),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

/// Read an env var, treating an empty value the same as an unset one.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from `<project_root>/configuration`, then layer the
/// process environment on top.
///
/// `APP_ENVIRONMENT` selects the environment file (`development` if unset).
/// Any field can be overridden with `APP_<SECTION>__<FIELD>`, e.g.
/// `APP_APPLICATION__PORT=5001`. The provider's conventional variable names
/// (`CONVERTKIT_API_SECRET`, `CONVERTKIT_FORM_ID`, with
/// `NEXT_PUBLIC_CONVERTKIT_FORM_ID` as fallback) and the Netlify deploy URLs
/// (`DEPLOY_PRIME_URL`, `DEPLOY_URL`, `CONTEXT`) are honoured as well.
/// An unknown `APP_ENVIRONMENT` is accepted and loads no environment file.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = env::current_dir()
        .map_err(|e| ConfigError::Foreign(Box::new(e)))?
        .join("configuration");

    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .map_err(ConfigError::Message)?;

    let form_id =
        non_empty_var("CONVERTKIT_FORM_ID").or_else(|| non_empty_var("NEXT_PUBLIC_CONVERTKIT_FORM_ID"));

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(
            config::File::from(cfg_dir.join(format!("{environment}.yaml")))
                .required(!matches!(environment, Environment::Other(_))),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override("deploy.environment", environment.to_string())?
        .set_override_option(
            "mailing_list.api_secret",
            non_empty_var("CONVERTKIT_API_SECRET"),
        )?
        .set_override_option("mailing_list.form_id", form_id)?
        .set_override_option("deploy.deploy_prime_url", non_empty_var("DEPLOY_PRIME_URL"))?
        .set_override_option("deploy.deploy_url", non_empty_var("DEPLOY_URL"))?
        .set_override_option("deploy.context", non_empty_var("CONTEXT"))?
        .set_override_option(
            "mailing_list.public_form_id",
            non_empty_var("NEXT_PUBLIC_CONVERTKIT_FORM_ID"),
        )?
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings.mailing_list.tag_cache_ttl()?;
    Ok(settings)
}
