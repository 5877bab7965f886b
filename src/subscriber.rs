//! Subscriber → profile bindings.
//!
//! A subscriber's config is rendered with the `default` overlay plus the
//! profile they are bound to. Binding is only allowed to a profile that
//! exists; an unknown subscriber or a blank binding renders as `default`.

use std::sync::Arc;

use crate::profile::{normalize_name, ProfileError, Profiles, DEFAULT_PROFILE_NAME};
use crate::store::{StoreError, Subscriber, SubscriberStore};

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("username is required")]
    EmptyUsername,
    #[error("subscriber not found: {0}")]
    NotFound(String),
    #[error("subscriber already exists: {0}")]
    AlreadyExists(String),
    #[error("stash profile not found: {0}")]
    ProfileNotFound(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn normalize_username(username: &str) -> Result<&str, SubscriberError> {
    match username.trim() {
        "" => Err(SubscriberError::EmptyUsername),
        trimmed => Ok(trimmed),
    }
}

/// Subscriber operations over a [`SubscriberStore`], validated against
/// [`Profiles`].
#[derive(Clone)]
pub struct Subscribers {
    store: Arc<dyn SubscriberStore>,
    profiles: Profiles,
}

impl Subscribers {
    pub fn new(store: Arc<dyn SubscriberStore>, profiles: Profiles) -> Self {
        Self { store, profiles }
    }

    fn existing_profile<'a>(&self, profile: &'a str) -> Result<&'a str, SubscriberError> {
        let profile = normalize_name(profile);
        if !self.profiles.exists(profile)? {
            return Err(SubscriberError::ProfileNotFound(profile.to_string()));
        }
        Ok(profile)
    }

    /// Register a subscriber bound to `profile` (blank means `default`).
    pub fn add(&self, username: &str, profile: &str) -> Result<Subscriber, SubscriberError> {
        let username = normalize_username(username)?;
        let profile = self.existing_profile(profile)?;
        if !self.store.insert_subscriber(username, profile)? {
            return Err(SubscriberError::AlreadyExists(username.to_string()));
        }
        tracing::info!(subscriber = username, profile, "added subscriber");
        Ok(Subscriber {
            username: username.to_string(),
            profile_name: profile.to_string(),
        })
    }

    pub fn set_profile(&self, username: &str, profile: &str) -> Result<(), SubscriberError> {
        let username = normalize_username(username)?;
        let profile = self.existing_profile(profile)?;
        if !self.store.set_subscriber_profile(username, profile)? {
            return Err(SubscriberError::NotFound(username.to_string()));
        }
        tracing::info!(subscriber = username, profile, "rebound subscriber profile");
        Ok(())
    }

    pub fn remove(&self, username: &str) -> Result<(), SubscriberError> {
        let username = normalize_username(username)?;
        if !self.store.delete_subscriber(username)? {
            return Err(SubscriberError::NotFound(username.to_string()));
        }
        tracing::info!(subscriber = username, "removed subscriber");
        Ok(())
    }

    /// All subscribers by username, blank bindings reported as `default`.
    pub fn list(&self) -> Result<Vec<Subscriber>, SubscriberError> {
        let mut subscribers = self.store.subscribers()?;
        for subscriber in &mut subscribers {
            subscriber.profile_name = normalize_name(&subscriber.profile_name).to_string();
        }
        Ok(subscribers)
    }

    /// Profile a subscriber's config is rendered with.
    pub fn profile_for(&self, username: &str) -> Result<String, SubscriberError> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(DEFAULT_PROFILE_NAME.to_string());
        }
        let profile = self.store.subscriber_profile(username)?;
        Ok(normalize_name(profile.as_deref().unwrap_or_default()).to_string())
    }
}
