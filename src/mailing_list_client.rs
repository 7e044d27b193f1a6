use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use reqwest::Response;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::NewSubscription;
use crate::domain::SubscriberEmail;

/// Provider-side numeric tag identifier
pub type TagId = u64;

/// The two values every subscribe request needs. Both are optional at startup;
/// see `require`.
#[derive(Clone, Debug)]
pub struct ProviderCredentials {
    pub api_secret: Option<Secret<String>>,
    pub form_id: Option<String>,
}

impl ProviderCredentials {
    /// Returns the secret and form id, or `None` if either is missing or blank.
    pub fn require(&self) -> Option<(&Secret<String>, &str)> {
        let api_secret = self
            .api_secret
            .as_ref()
            .filter(|s| !s.expose_secret().trim().is_empty())?;
        let form_id = self
            .form_id
            .as_deref()
            .filter(|f| !f.trim().is_empty())?;
        Some((api_secret, form_id))
    }
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    api_secret: &'a str,
    email: &'a str,
    first_name: &'a str,
    fields: BTreeMap<String, String>,
    tags: &'a [String],
}

#[derive(Serialize)]
struct CreateTagRequest<'a> {
    api_secret: &'a str,
    tag: NewTag<'a>,
}

#[derive(Serialize)]
struct NewTag<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct TagSubscriberRequest<'a> {
    api_secret: &'a str,
    email: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
struct CreatedTag {
    tag: Option<CreatedTagBody>,
}

#[derive(Deserialize)]
struct CreatedTagBody {
    id: Option<TagId>,
}

/// Thin wrapper over the provider's REST API. Cheap to clone: `reqwest::Client`
/// is reference counted internally, so clones share one connection pool.
#[derive(Clone, Debug)]
pub struct MailingListClient {
    http_client: Client,
    base_url: String,
}

impl MailingListClient {
    pub fn new(
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// `POST /forms/{form_id}/subscribe`
    ///
    /// The raw response is returned even for non-2xx statuses; the caller
    /// decides how provider rejections are reported.
    #[tracing::instrument(
        name = "Subscribing email with provider",
        skip_all,
        fields(subscriber_email = %new_sub.email, form_id = %form_id)
    )]
    pub async fn subscribe(
        &self,
        api_secret: &Secret<String>,
        form_id: &str,
        new_sub: &NewSubscription,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}/forms/{form_id}/subscribe", self.base_url);
        let body = SubscribeRequest {
            api_secret: api_secret.expose_secret(),
            email: new_sub.email.as_ref(),
            first_name: new_sub.first_name.as_deref().unwrap_or(""),
            fields: new_sub.fields(),
            tags: &new_sub.tags,
        };
        self.http_client.post(&url).json(&body).send().await
    }

    /// `GET /tags`: every tag on the account, not a filtered lookup.
    #[tracing::instrument(name = "Listing provider tags", skip_all)]
    pub async fn list_tags(
        &self,
        api_secret: &Secret<String>,
    ) -> Result<Vec<Tag>, reqwest::Error> {
        let url = format!("{}/tags", self.base_url);
        let list: TagList = self
            .http_client
            .get(&url)
            .query(&[("api_secret", api_secret.expose_secret())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.tags)
    }

    /// `POST /tags`. `Ok(None)` means the provider accepted the request but did
    /// not report an id for the new tag.
    #[tracing::instrument(name = "Creating provider tag", skip(self, api_secret))]
    pub async fn create_tag(
        &self,
        api_secret: &Secret<String>,
        name: &str,
    ) -> Result<Option<TagId>, reqwest::Error> {
        let url = format!("{}/tags", self.base_url);
        let body = CreateTagRequest {
            api_secret: api_secret.expose_secret(),
            tag: NewTag { name },
        };
        let created: CreatedTag = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created.tag.and_then(|t| t.id))
    }

    /// `POST /tags/{tag_id}/subscribe`
    #[tracing::instrument(
        name = "Tagging subscriber",
        skip(self, api_secret, email),
        fields(subscriber_email = %email)
    )]
    pub async fn tag_subscriber(
        &self,
        api_secret: &Secret<String>,
        tag_id: TagId,
        email: &SubscriberEmail,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/tags/{tag_id}/subscribe", self.base_url);
        let body = TagSubscriberRequest {
            api_secret: api_secret.expose_secret(),
            email: email.as_ref(),
        };
        self.http_client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
