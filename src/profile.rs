//! Named overlay documents ("profiles").
//!
//! A profile is a YAML mapping deep-merged onto the generated base
//! document. The `default` profile always exists; it is created with an
//! empty mapping the first time anything looks for it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::{ProfileStore, StoreError};

pub const DEFAULT_PROFILE_NAME: &str = "default";
const EMPTY_PROFILE_YAML: &str = "{}\n";

/// Parsed overlay document.
pub type OverlayDocument = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid yaml: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("profile root must be a mapping, got {0}")]
    NotMapping(&'static str),
    #[error("stash profile not found: {0}")]
    NotFound(String),
    #[error("stash profile already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub content: String,
    pub is_default: bool,
}

/// Trimmed name; blank means the default profile.
pub fn normalize_name(name: &str) -> &str {
    match name.trim() {
        "" => DEFAULT_PROFILE_NAME,
        trimmed => trimmed,
    }
}

/// Trimmed content with a trailing newline; blank becomes `{}`.
pub fn normalize_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return EMPTY_PROFILE_YAML.to_string();
    }
    format!("{trimmed}\n")
}

/// Parse profile YAML. The root must be a mapping; an empty or null
/// document is an empty mapping.
pub fn parse_profile_content(content: &str) -> Result<OverlayDocument, ProfileError> {
    let normalized = normalize_content(content);
    match serde_yaml::from_str::<Value>(&normalized)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Array(_) => Err(ProfileError::NotMapping("a sequence")),
        Value::String(_) => Err(ProfileError::NotMapping("a string")),
        Value::Number(_) => Err(ProfileError::NotMapping("a number")),
        Value::Bool(_) => Err(ProfileError::NotMapping("a boolean")),
    }
}

/// Profile operations over a [`ProfileStore`].
#[derive(Clone)]
pub struct Profiles {
    store: Arc<dyn ProfileStore>,
}

impl Profiles {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    fn ensure_default(&self) -> Result<(), StoreError> {
        if self.store.insert_profile(DEFAULT_PROFILE_NAME, EMPTY_PROFILE_YAML)? {
            tracing::info!("initialized default stash profile");
        }
        Ok(())
    }

    /// All profiles, default first, the rest by name.
    pub fn list(&self) -> Result<Vec<Profile>, ProfileError> {
        self.ensure_default()?;
        let mut profiles = Vec::new();
        for name in self.store.profile_names()? {
            // a concurrent writer may not have committed the content yet
            let Some(content) = self.store.get_profile(&name)? else {
                continue;
            };
            profiles.push(Profile {
                is_default: name == DEFAULT_PROFILE_NAME,
                name,
                content,
            });
        }
        profiles.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
        Ok(profiles)
    }

    /// Raw YAML of one profile.
    pub fn get(&self, name: &str) -> Result<Profile, ProfileError> {
        let name = normalize_name(name);
        if name == DEFAULT_PROFILE_NAME {
            self.ensure_default()?;
        }
        let content = self
            .store
            .get_profile(name)?
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        Ok(Profile {
            name: name.to_string(),
            content,
            is_default: name == DEFAULT_PROFILE_NAME,
        })
    }

    /// Whether the profile exists. `default` always does.
    pub fn exists(&self, name: &str) -> Result<bool, ProfileError> {
        let name = normalize_name(name);
        if name == DEFAULT_PROFILE_NAME {
            self.ensure_default()?;
            return Ok(true);
        }
        Ok(self.store.get_profile(name)?.is_some())
    }

    pub fn create(&self, name: &str, content: &str) -> Result<(), ProfileError> {
        let name = normalize_name(name);
        parse_profile_content(content)?;
        if name == DEFAULT_PROFILE_NAME {
            self.ensure_default()?;
        }
        if !self.store.insert_profile(name, &normalize_content(content))? {
            return Err(ProfileError::AlreadyExists(name.to_string()));
        }
        tracing::info!(profile = name, "created stash profile");
        Ok(())
    }

    pub fn update(&self, name: &str, content: &str) -> Result<(), ProfileError> {
        let name = normalize_name(name);
        parse_profile_content(content)?;
        if name == DEFAULT_PROFILE_NAME {
            self.ensure_default()?;
        }
        if self.store.get_profile(name)?.is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        self.store.put_profile(name, &normalize_content(content))?;
        tracing::info!(profile = name, "updated stash profile");
        Ok(())
    }

    /// Resolve and parse overlays in the given order. Any unknown or invalid
    /// profile fails the whole call.
    pub fn overlay_documents<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<OverlayDocument>, ProfileError> {
        names
            .iter()
            .map(|name| {
                let profile = self.get(name.as_ref())?;
                parse_profile_content(&profile.content)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn profiles() -> Profiles {
        Profiles::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("  work "), "work");
        assert_eq!(normalize_name("   "), "default");
        assert_eq!(normalize_name(""), "default");
    }

    #[test]
    fn content_normalization() {
        assert_eq!(normalize_content(""), "{}\n");
        assert_eq!(normalize_content("  \n "), "{}\n");
        assert_eq!(normalize_content("a: 1"), "a: 1\n");
        assert_eq!(normalize_content("\na: 1\n\n"), "a: 1\n");
    }

    #[test]
    fn parse_accepts_mappings_and_null() {
        assert!(parse_profile_content("").unwrap().is_empty());
        assert!(parse_profile_content("~").unwrap().is_empty());
        let doc = parse_profile_content("rules:\n  - MATCH,Final\nmode: rule\n").unwrap();
        assert_eq!(doc["mode"], "rule");
        assert_eq!(doc["rules"][0], "MATCH,Final");
    }

    #[test]
    fn parse_rejects_non_mappings() {
        assert!(matches!(
            parse_profile_content("- a\n- b\n"),
            Err(ProfileError::NotMapping("a sequence"))
        ));
        assert!(matches!(
            parse_profile_content("just text"),
            Err(ProfileError::NotMapping(_))
        ));
        assert!(matches!(
            parse_profile_content("a: [1, 2"),
            Err(ProfileError::InvalidYaml(_))
        ));
    }

    #[test]
    fn default_profile_is_created_lazily() {
        let profiles = profiles();
        let listed = profiles.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "default");
        assert_eq!(listed[0].content, "{}\n");
        assert!(listed[0].is_default);
    }

    #[test]
    fn list_orders_default_first_then_by_name() {
        let profiles = profiles();
        profiles.create("zeta", "a: 1").unwrap();
        profiles.create("alpha", "a: 2").unwrap();
        let names: Vec<_> = profiles.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["default", "alpha", "zeta"]);
    }

    #[test]
    fn create_and_update_semantics() {
        let profiles = profiles();
        profiles.create(" work ", "mode: global").unwrap();
        assert_eq!(profiles.get("work").unwrap().content, "mode: global\n");

        assert!(matches!(
            profiles.create("work", "{}"),
            Err(ProfileError::AlreadyExists(name)) if name == "work"
        ));
        assert!(matches!(
            profiles.create("", "{}"),
            Err(ProfileError::AlreadyExists(name)) if name == "default"
        ));
        assert!(matches!(
            profiles.update("missing", "{}"),
            Err(ProfileError::NotFound(_))
        ));

        profiles.update("work", "mode: rule\n").unwrap();
        assert_eq!(profiles.get("work").unwrap().content, "mode: rule\n");
        profiles.update("", "log-level: debug").unwrap();
        assert_eq!(profiles.get("default").unwrap().content, "log-level: debug\n");
    }

    #[test]
    fn invalid_content_is_never_written() {
        let profiles = profiles();
        assert!(profiles.create("bad", "- not a mapping").is_err());
        assert!(matches!(profiles.get("bad"), Err(ProfileError::NotFound(_))));

        profiles.create("good", "a: 1").unwrap();
        assert!(profiles.update("good", "a: [").is_err());
        assert_eq!(profiles.get("good").unwrap().content, "a: 1\n");
    }

    #[test]
    fn exists_reports_default_and_created_profiles() {
        let profiles = profiles();
        assert!(profiles.exists("").unwrap());
        assert!(profiles.exists("default").unwrap());
        assert!(!profiles.exists("work").unwrap());
        profiles.create("work", "{}").unwrap();
        assert!(profiles.exists(" work ").unwrap());
    }

    #[test]
    fn overlay_documents_resolve_in_order() {
        let profiles = profiles();
        profiles.create("work", "mode: global").unwrap();
        let docs = profiles.overlay_documents(&["default", "work"]).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].is_empty());
        assert_eq!(docs[1]["mode"], "global");

        assert!(matches!(
            profiles.overlay_documents(&["default", "nope"]),
            Err(ProfileError::NotFound(_))
        ));
    }
}
