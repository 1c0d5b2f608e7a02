//! Per-topic problems collected during a build.
//!
//! Nothing recorded here stops the build; the entries are rendered into the
//! book's errors chapter.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use log::{error, warn};
use serde::Serialize;

use crate::topic::BuildTopic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorSeverity {
    Warning,
    Error,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorItem {
    pub severity: ErrorSeverity,
    pub message: String,
}

/// What the errors chapter shows about the offending topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub id: i64,
    pub topic_id: i64,
    pub revision: i64,
    pub translated: bool,
    pub tags: String,
    pub error_xref_id: String,
}

impl From<&BuildTopic> for TopicSummary {
    fn from(topic: &BuildTopic) -> Self {
        Self {
            id: topic.id(),
            topic_id: topic.topic_id(),
            revision: topic.topic_revision(),
            translated: topic.is_translated(),
            tags: topic.tag_names(),
            error_xref_id: topic.error_xref_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicErrorData {
    pub topic: TopicSummary,
    pub items: Vec<ErrorItem>,
}

impl TopicErrorData {
    pub fn items_of(&self, severity: ErrorSeverity) -> impl Iterator<Item = &ErrorItem> {
        self.items.iter().filter(move |i| i.severity == severity)
    }
}

#[derive(Debug, Default)]
pub struct ErrorDatabase {
    /// Locale entries are filed under
    locale: String,
    /// Locale to topic id to entries, topics in first-report order
    errors: BTreeMap<String, IndexMap<i64, TopicErrorData>>,
}

impl ErrorDatabase {
    /// Database for a build in `locale`. Every entry is filed under the
    /// build locale, whatever locale the reported topic carries.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            errors: BTreeMap::new(),
        }
    }

    fn add(&mut self, topic: &BuildTopic, severity: ErrorSeverity, message: &str) {
        let item = ErrorItem {
            severity,
            message: message.to_string(),
        };
        let data = self
            .errors
            .entry(self.locale.clone())
            .or_default()
            .entry(topic.topic_id())
            .or_insert_with(|| TopicErrorData {
                topic: TopicSummary::from(topic),
                items: Vec::new(),
            });
        // the same problem can be reported once per occurrence
        if !data.items.contains(&item) {
            data.items.push(item);
        }
    }

    pub fn add_error(&mut self, topic: &BuildTopic, message: &str) {
        error!("Topic {}: {}", topic.topic_id(), message);
        self.add(topic, ErrorSeverity::Error, message);
    }

    pub fn add_warning(&mut self, topic: &BuildTopic, message: &str) {
        warn!("Topic {}: {}", topic.topic_id(), message);
        self.add(topic, ErrorSeverity::Warning, message);
    }

    pub fn has_items(&self, locale: &str) -> bool {
        self.errors.get(locale).is_some_and(|topics| !topics.is_empty())
    }

    /// Entries for `locale`, in the order topics were first reported.
    pub fn errors(&self, locale: &str) -> Vec<&TopicErrorData> {
        self.errors
            .get(locale)
            .map(|topics| topics.values().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, severity: ErrorSeverity) -> usize {
        self.errors
            .values()
            .flat_map(|topics| topics.values())
            .map(|data| data.items_of(severity).count())
            .sum()
    }
}
