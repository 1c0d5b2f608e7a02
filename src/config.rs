//! Build options.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{DEFAULT_MAX_NAME_ATTEMPTS, DEFAULT_MAX_RETRIES};
use crate::error::BuildError;
use crate::topic::BuildTopic;

/// How a party (the caller or the content spec) wants injection handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    /// No preference
    #[default]
    None,
    Off,
    On,
    /// Only topics of the listed types are processed
    Strict,
}

impl fmt::Display for InjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionMode::None => write!(f, "none"),
            InjectionMode::Off => write!(f, "off"),
            InjectionMode::On => write!(f, "on"),
            InjectionMode::Strict => write!(f, "strict"),
        }
    }
}

/// Resolved injection policy for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionOptions {
    pub client: InjectionMode,
    pub content_spec: InjectionMode,
    /// Topic type tag names injection is restricted to in strict mode
    pub strict_topic_types: Vec<String>,
}

impl InjectionOptions {
    /// Combines the caller's options with the content spec's own policy.
    pub fn resolve(options: &BuildingOptions, spec_mode: InjectionMode, spec_types: &[String]) -> Self {
        let client = match options.injection {
            Some(false) => InjectionMode::Off,
            Some(true) | None if !options.injection_types.is_empty() => InjectionMode::Strict,
            Some(true) => InjectionMode::On,
            None => InjectionMode::None,
        };

        let mut strict_topic_types = options.injection_types.clone();
        for kind in spec_types {
            if !strict_topic_types.iter().any(|t| t.eq_ignore_ascii_case(kind)) {
                strict_topic_types.push(kind.clone());
            }
        }

        Self {
            client,
            content_spec: spec_mode,
            strict_topic_types,
        }
    }

    pub fn is_injection_allowed(&self) -> bool {
        match self.client {
            InjectionMode::Off => false,
            InjectionMode::On | InjectionMode::Strict => true,
            InjectionMode::None => self.content_spec != InjectionMode::Off,
        }
    }

    fn is_strict(&self) -> bool {
        self.client == InjectionMode::Strict
            || (self.client == InjectionMode::None && self.content_spec == InjectionMode::Strict)
    }

    /// Whether injection markers in `topic` should be processed.
    pub fn is_injection_allowed_for(&self, topic: &BuildTopic) -> bool {
        if !self.is_injection_allowed() {
            return false;
        }
        if !self.is_strict() {
            return true;
        }
        topic.tags().iter().any(|tag| {
            self.strict_topic_types
                .iter()
                .any(|kind| kind.eq_ignore_ascii_case(&tag.name))
        })
    }
}

/// Options controlling a single book build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingOptions {
    /// Downgrade unresolved injection references to warnings
    pub ignore_missing_injections: bool,
    pub suppress_errors_page: bool,
    pub suppress_content_spec_page: bool,
    pub insert_bugzilla_links: bool,
    pub bugzilla_url: String,
    /// `Some(false)` turns injection off, `Some(true)` forces it on
    pub injection: Option<bool>,
    pub injection_types: Vec<String>,
    /// Values substituted into the book metadata templates
    pub overrides: BTreeMap<String, String>,
    pub publican_show_remarks: bool,
    pub cvs_pkg: Option<String>,
    pub build_name: Option<String>,
    /// Fixed build date; the current time when unset
    pub build_date: Option<DateTime<Utc>>,
    pub default_locale: String,
    pub fixed_url_retries: usize,
    pub fixed_url_name_attempts: usize,
}

impl Default for BuildingOptions {
    fn default() -> Self {
        Self {
            ignore_missing_injections: false,
            suppress_errors_page: false,
            suppress_content_spec_page: false,
            insert_bugzilla_links: true,
            bugzilla_url: "https://bugzilla.redhat.com/".to_string(),
            injection: None,
            injection_types: Vec::new(),
            overrides: BTreeMap::new(),
            publican_show_remarks: false,
            cvs_pkg: None,
            build_name: None,
            build_date: None,
            default_locale: "en-US".to_string(),
            fixed_url_retries: DEFAULT_MAX_RETRIES,
            fixed_url_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }
}

impl BuildingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, BuildError> {
        let options: Self =
            toml::from_str(content).map_err(|e| BuildError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build options: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse build options: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.default_locale.trim().is_empty() {
            return Err(BuildError::Config("default_locale must not be empty".to_string()));
        }
        if self.fixed_url_retries == 0 {
            return Err(BuildError::Config(
                "fixed_url_retries must be at least 1".to_string(),
            ));
        }
        if self.fixed_url_name_attempts == 0 {
            return Err(BuildError::Config(
                "fixed_url_name_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
