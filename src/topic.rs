//! Topics as fetched from the topic store.
//!
//! A book is built either from plain topics or, for localized builds, from
//! translated topics. Both are carried through the pipeline as a
//! [`BuildTopic`], which exposes the capabilities the builder needs without
//! caring which kind it holds.

use serde::{Deserialize, Serialize};

/// Property holding a topic's persisted stable address.
pub const FIXED_URL_PROPERTY_TAG_ID: i64 = 20;
/// Tag properties feeding the bug-report link.
pub const BUG_PRODUCT_PROPERTY_TAG_ID: i64 = 21;
pub const BUG_COMPONENT_PROPERTY_TAG_ID: i64 = 22;
pub const BUG_VERSION_PROPERTY_TAG_ID: i64 = 23;
pub const BUG_KEYWORDS_PROPERTY_TAG_ID: i64 = 24;
pub const BUG_ASSIGNED_TO_PROPERTY_TAG_ID: i64 = 25;

/// Category of tags naming the topic's writers.
pub const WRITER_CATEGORY_ID: i64 = 12;

/// Topic type tags.
pub const TASK_TAG_ID: i64 = 4;
pub const REFERENCE_TAG_ID: i64 = 5;
pub const CONCEPT_TAG_ID: i64 = 6;
pub const CONCEPTUAL_OVERVIEW_TAG_ID: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTag {
    pub id: i64,
    pub value: String,
    /// Whether the store considers the value valid (unique where required)
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl PropertyTag {
    pub fn new(id: i64, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            valid: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<i64>,
    #[serde(default)]
    pub properties: Vec<PropertyTag>,
}

impl Tag {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            categories: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.categories.push(category_id);
        self
    }

    pub fn with_property(mut self, property: PropertyTag) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, id: i64) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.value.as_str())
    }
}

/// A source-language topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub revision: i64,
    pub title: String,
    pub xml: String,
    pub locale: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub properties: Vec<PropertyTag>,
    /// Cached copies of related topics. Copies never carry relationships.
    #[serde(default)]
    pub outgoing: Vec<BuildTopic>,
    #[serde(default)]
    pub incoming: Vec<BuildTopic>,
}

impl Topic {
    pub fn new(id: i64, title: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            id,
            revision: 1,
            title: title.into(),
            xml: xml.into(),
            locale: "en-US".to_string(),
            tags: Vec::new(),
            properties: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_property(mut self, property: PropertyTag) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    /// Copy without relationships, as held in other topics' relationship lists.
    pub fn shallow(&self) -> Self {
        Self {
            outgoing: Vec::new(),
            incoming: Vec::new(),
            ..self.clone()
        }
    }

    /// Records an outgoing relationship to `other` on `self` and the matching
    /// incoming relationship on `other`.
    pub fn relate_to(&mut self, other: &mut Topic) {
        self.outgoing.push(BuildTopic::Plain(other.shallow()));
        other.incoming.push(BuildTopic::Plain(self.shallow()));
    }
}

/// A topic in a target locale, possibly a synthesized placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedTopic {
    /// Translated payload; `topic.id` is the translation's own id
    pub topic: Topic,
    /// Id of the source topic
    pub topic_id: i64,
    pub topic_revision: i64,
    pub translation_percentage: u8,
    /// Set on placeholders built for topics that have no translation
    #[serde(default)]
    pub dummy: bool,
}

impl TranslatedTopic {
    pub fn shallow(&self) -> Self {
        Self {
            topic: self.topic.shallow(),
            ..self.clone()
        }
    }
}

/// Topic payload as seen by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuildTopic {
    Plain(Topic),
    Translated(TranslatedTopic),
}

impl BuildTopic {
    pub fn base(&self) -> &Topic {
        match self {
            BuildTopic::Plain(t) => t,
            BuildTopic::Translated(t) => &t.topic,
        }
    }

    pub fn base_mut(&mut self) -> &mut Topic {
        match self {
            BuildTopic::Plain(t) => t,
            BuildTopic::Translated(t) => &mut t.topic,
        }
    }

    /// The entity's own id (negative for translation placeholders).
    pub fn id(&self) -> i64 {
        self.base().id
    }

    /// The source topic id, used for book membership and relationships.
    pub fn topic_id(&self) -> i64 {
        match self {
            BuildTopic::Plain(t) => t.id,
            BuildTopic::Translated(t) => t.topic_id,
        }
    }

    /// The source topic revision.
    pub fn topic_revision(&self) -> i64 {
        match self {
            BuildTopic::Plain(t) => t.revision,
            BuildTopic::Translated(t) => t.topic_revision,
        }
    }

    pub fn title(&self) -> &str {
        &self.base().title
    }

    pub fn xml(&self) -> &str {
        &self.base().xml
    }

    pub fn locale(&self) -> &str {
        &self.base().locale
    }

    pub fn tags(&self) -> &[Tag] {
        &self.base().tags
    }

    pub fn properties(&self) -> &[PropertyTag] {
        &self.base().properties
    }

    pub fn outgoing(&self) -> &[BuildTopic] {
        &self.base().outgoing
    }

    pub fn incoming(&self) -> &[BuildTopic] {
        &self.base().incoming
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, BuildTopic::Translated(_))
    }

    pub fn is_dummy(&self) -> bool {
        match self {
            BuildTopic::Plain(_) => false,
            BuildTopic::Translated(t) => t.dummy,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        match self {
            BuildTopic::Plain(_) => false,
            BuildTopic::Translated(t) => t.translation_percentage < 100,
        }
    }

    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags().iter().any(|t| t.id == tag_id)
    }

    pub fn tag_names(&self) -> String {
        self.tags()
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// First value of a tag property across the topic's tags.
    pub fn tag_property(&self, property_id: i64) -> Option<&str> {
        self.tags().iter().find_map(|t| t.property(property_id))
    }

    /// The currently valid stable address, if one has been assigned.
    pub fn fixed_url(&self) -> Option<&str> {
        self.properties()
            .iter()
            .find(|p| p.id == FIXED_URL_PROPERTY_TAG_ID && p.valid && !p.value.is_empty())
            .map(|p| p.value.as_str())
    }

    /// Identifier-based link target.
    pub fn xref_id(&self) -> String {
        format!("TopicID{}", self.topic_id())
    }

    /// Anchor of this topic's entry in the errors chapter.
    pub fn error_xref_id(&self) -> String {
        format!("TopicErrorID{}", self.topic_id())
    }

    /// Link target without duplicate suffix.
    pub fn link_id(&self, use_fixed_urls: bool) -> String {
        match self.fixed_url() {
            Some(url) if use_fixed_urls => url.to_string(),
            _ => self.xref_id(),
        }
    }

    pub fn shallow(&self) -> Self {
        match self {
            BuildTopic::Plain(t) => BuildTopic::Plain(t.shallow()),
            BuildTopic::Translated(t) => BuildTopic::Translated(t.shallow()),
        }
    }

    /// Whether `topic_id` appears among the outgoing relationships.
    pub fn is_related_to(&self, topic_id: i64) -> bool {
        self.outgoing().iter().any(|t| t.topic_id() == topic_id)
    }

    pub fn related_topic(&self, topic_id: i64) -> Option<&BuildTopic> {
        self.outgoing().iter().find(|t| t.topic_id() == topic_id)
    }
}
