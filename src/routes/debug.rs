use std::collections::BTreeMap;

use actix_web::web;
use actix_web::HttpResponse;
use serde::Serialize;

use crate::configuration::DeploySettings;
use crate::configuration::Environment;
use crate::configuration::MailingListSettings;

const REDACTED: &str = "[REDACTED]";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Diagnostics<'a> {
    environment: String,
    netlify_context: Option<&'a str>,
    deploy_url: Option<&'a str>,
    deploy_prime_url: Option<&'a str>,
    config: ConfigSummary<'a>,
    available_env_vars: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSummary<'a> {
    has_secret: bool,
    secret_length: usize,
    form_id: Option<&'a str>,
    has_public_form_id: bool,
    public_form_id: Option<&'a str>,
}

/// Provider-related variables (name contains `CONVERTKIT`), with the value of
/// any `SECRET` one replaced.
fn provider_env_vars(vars: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter(|(key, _)| key.contains("CONVERTKIT"))
        .map(|(key, value)| {
            let value = if key.contains("SECRET") {
                REDACTED.to_string()
            } else {
                value
            };
            (key, value)
        })
        .collect()
}

/// `GET /api/debug/mailing-list`
///
/// Shows whether the provider credentials made it into the running instance,
/// without revealing the secret itself. Not served in production.
pub async fn mailing_list_diagnostics(
    mailing_list: web::Data<MailingListSettings>,
    deploy: web::Data<DeploySettings>,
) -> HttpResponse {
    if deploy.environment == Environment::Production {
        return HttpResponse::NotFound()
            .json(serde_json::json!({"error": "Not available in production"}));
    }

    let process_vars = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));

    let secret_length = mailing_list.secret_length();
    let public_form_id = mailing_list.public_form_id.as_deref();
    HttpResponse::Ok().json(Diagnostics {
        environment: deploy.environment.to_string(),
        netlify_context: deploy.context.as_deref(),
        deploy_url: deploy.deploy_url.as_deref(),
        deploy_prime_url: deploy.deploy_prime_url.as_deref(),
        config: ConfigSummary {
            has_secret: secret_length > 0,
            secret_length,
            form_id: mailing_list.form_id.as_deref(),
            has_public_form_id: public_form_id.is_some(),
            public_form_id,
        },
        available_env_vars: provider_env_vars(process_vars),
    })
}
