//! Resolving tag names to provider tag ids and applying them to subscribers.
//!
//! Tagging is best-effort: nothing in here returns an error. Every failure is
//! logged and shows up only as a `failed` count in `TagApplicationOutcome`.

mod cache;

use std::sync::Arc;

pub use cache::Clock;
pub use cache::SystemClock;
pub use cache::TagCache;
use secrecy::Secret;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::domain::SubscriberEmail;
use crate::mailing_list_client::MailingListClient;
use crate::mailing_list_client::TagId;

/// Aggregate result of `apply_tags_to_subscriber`.
///
/// `success + failed` always equals the number of tag names requested; a tag
/// that could not be resolved and a tag that failed to apply both count as
/// `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagApplicationOutcome {
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct TagResolution {
    pub tag_name: String,
    pub id: Option<TagId>,
}

/// Cloning is cheap and every clone shares the same `TagCache`.
#[derive(Clone)]
pub struct TagSynchronizer {
    client: MailingListClient,
    cache: Arc<TagCache>,
}

impl TagSynchronizer {
    pub fn new(
        client: MailingListClient,
        cache: Arc<TagCache>,
    ) -> Self {
        Self { client, cache }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &TagCache { &self.cache }

    /// Look up the provider id for `tag_name`, creating the tag if the
    /// provider does not know it yet.
    ///
    /// A cache miss fetches the account's *entire* tag list and caches all of
    /// it, so later lookups of other names are served locally too. `None`
    /// means the tag could neither be found nor created.
    #[tracing::instrument(name = "Resolving tag id", skip(self, api_secret))]
    pub async fn resolve_or_create_tag_id(
        &self,
        api_secret: &Secret<String>,
        tag_name: &str,
    ) -> Option<TagId> {
        if let Some(id) = self.cache.get(tag_name) {
            tracing::debug!(tag_id = id, "tag id served from cache");
            return Some(id);
        }

        let tags = match self.client.list_tags(api_secret).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "could not list tags"
                );
                return None;
            }
        };

        // on duplicate names the last one wins, as it does in the cache
        let existing = tags.iter().rfind(|t| t.name == tag_name).map(|t| t.id);
        self.cache
            .extend(tags.into_iter().map(|t| (t.name, t.id)));
        if existing.is_some() {
            return existing;
        }

        match self.client.create_tag(api_secret, tag_name).await {
            Ok(Some(id)) => {
                tracing::info!(tag_id = id, "created tag");
                self.cache.insert(tag_name, id);
                Some(id)
            }
            Ok(None) => {
                tracing::warn!("provider created tag but returned no id");
                None
            }
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "could not create tag"
                );
                None
            }
        }
    }

    /// `true` if the provider accepted the tagging, `false` otherwise.
    #[tracing::instrument(
        name = "Applying tag to subscriber",
        skip(self, api_secret, email),
        fields(subscriber_email = %email)
    )]
    pub async fn apply_tag_to_subscriber(
        &self,
        api_secret: &Secret<String>,
        tag_id: TagId,
        email: &SubscriberEmail,
        tag_name: &str,
    ) -> bool {
        match self.client.tag_subscriber(api_secret, tag_id, email).await {
            Ok(()) => {
                tracing::info!("tagged subscriber");
                true
            }
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "could not tag subscriber"
                );
                false
            }
        }
    }

    /// Resolve every name concurrently, then apply every resolved id
    /// concurrently. Each batch is awaited until all of its tasks have finished;
    /// one tag failing (or its task panicking) never stops the others.
    #[tracing::instrument(
        name = "Applying tags to subscriber",
        skip(self, api_secret, email),
        fields(subscriber_email = %email)
    )]
    pub async fn apply_tags_to_subscriber(
        &self,
        api_secret: &Secret<String>,
        tag_names: &[String],
        email: &SubscriberEmail,
    ) -> TagApplicationOutcome {
        if tag_names.is_empty() {
            return TagApplicationOutcome::default();
        }
        let requested = tag_names.len();

        let mut resolutions = JoinSet::new();
        for tag_name in tag_names {
            let sync = self.clone();
            let api_secret = api_secret.clone();
            let tag_name = tag_name.clone();
            resolutions.spawn(
                async move {
                    let id = sync.resolve_or_create_tag_id(&api_secret, &tag_name).await;
                    TagResolution { tag_name, id }
                }
                .in_current_span(),
            );
        }

        let mut resolved = Vec::with_capacity(requested);
        while let Some(joined) = resolutions.join_next().await {
            match joined {
                Ok(TagResolution {
                    tag_name,
                    id: Some(id),
                }) => resolved.push((tag_name, id)),
                Ok(TagResolution { tag_name, id: None }) => {
                    tracing::warn!(%tag_name, "could not find or create tag")
                }
                Err(e) => tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "tag resolution task failed"
                ),
            }
        }

        if resolved.is_empty() {
            tracing::warn!("no tags could be resolved");
            return TagApplicationOutcome {
                success: 0,
                failed: requested,
            };
        }

        let mut applications = JoinSet::new();
        for (tag_name, tag_id) in resolved {
            let sync = self.clone();
            let api_secret = api_secret.clone();
            let email = email.clone();
            applications.spawn(
                async move {
                    sync.apply_tag_to_subscriber(&api_secret, tag_id, &email, &tag_name)
                        .await
                }
                .in_current_span(),
            );
        }

        let mut success = 0;
        while let Some(joined) = applications.join_next().await {
            match joined {
                Ok(true) => success += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "tag application task failed"
                ),
            }
        }

        TagApplicationOutcome {
            success,
            failed: requested - success,
        }
    }
}
