//! The content specification tree handed to the builder.
//!
//! Parsing the authored content-spec text is not this crate's job: callers
//! build (or deserialize) a [`ContentSpec`] and pass it in already validated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::create_url_title;
use crate::config::InjectionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelType {
    /// The invisible root of the tree
    Base,
    Part,
    Chapter,
    Appendix,
    Section,
}

impl LevelType {
    /// Prefix of stable link ids, following Publican's conventions.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            LevelType::Base => "book",
            LevelType::Part => "part",
            LevelType::Chapter => "chap",
            LevelType::Appendix => "appe",
            LevelType::Section => "sect",
        }
    }

    /// DocBook element the level is rendered as.
    pub fn element_name(&self) -> &'static str {
        match self {
            LevelType::Base => "book",
            LevelType::Part => "part",
            LevelType::Chapter => "chapter",
            LevelType::Appendix => "appendix",
            LevelType::Section => "section",
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelType::Base => write!(f, "Base"),
            LevelType::Part => write!(f, "Part"),
            LevelType::Chapter => write!(f, "Chapter"),
            LevelType::Appendix => write!(f, "Appendix"),
            LevelType::Section => write!(f, "Section"),
        }
    }
}

/// Link id of a level.
///
/// With stable addressing this is `<prefix>-<slug>[-<dup>]`, otherwise
/// `<Type>ID<step>`.
pub fn level_link_id(
    level_type: LevelType,
    title: &str,
    duplicate_id: Option<usize>,
    step: usize,
    use_fixed_urls: bool,
) -> String {
    if !use_fixed_urls {
        return format!("{}ID{}", level_type, step);
    }
    let base = format!("{}-{}", level_type.id_prefix(), create_url_title(title));
    match duplicate_id {
        Some(dup) => format!("{}-{}", base, dup),
        None => base,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Relationships come from the content spec itself
    #[default]
    ContentSpecProcessor,
    /// Relationships come from the topics, bucketed by topic type
    Skynet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Prerequisite,
    Related,
    Next,
    Previous,
}

/// A relationship declared in the content spec, pointing at a topic
/// reference or level by its target id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub target: String,
}

/// One reference to a topic within the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTopic {
    /// Spec-unique reference id, e.g. `T12` or an explicit target
    pub id: String,
    pub topic_id: i64,
    pub revision: Option<i64>,
    pub title: String,
    pub condition: Option<String>,
    pub target_id: Option<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Assigned at registration; `None` for the first occurrence
    #[serde(default)]
    pub duplicate_id: Option<usize>,
    /// Assigned at registration
    #[serde(default)]
    pub step: usize,
}

impl SpecTopic {
    pub fn new(topic_id: i64, title: impl Into<String>) -> Self {
        Self {
            id: format!("T{}", topic_id),
            topic_id,
            revision: None,
            title: title.into(),
            condition: None,
            target_id: None,
            relationships: Vec::new(),
            duplicate_id: None,
            step: 0,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_relationship(mut self, kind: RelationshipKind, target: impl Into<String>) -> Self {
        self.relationships.push(Relationship {
            kind,
            target: target.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum Node {
    Level(Level),
    Topic(SpecTopic),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub level_type: LevelType,
    pub title: String,
    pub target_id: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub duplicate_id: Option<usize>,
    #[serde(default)]
    pub step: usize,
}

impl Level {
    pub fn new(level_type: LevelType, title: impl Into<String>) -> Self {
        Self {
            level_type,
            title: title.into(),
            target_id: None,
            children: Vec::new(),
            duplicate_id: None,
            step: 0,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.children.push(Node::Level(level));
        self
    }

    pub fn with_topic(mut self, topic: SpecTopic) -> Self {
        self.children.push(Node::Topic(topic));
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Whether any topic reference lives in this level or below.
    pub fn has_spec_topics(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Topic(_) => true,
            Node::Level(level) => level.has_spec_topics(),
        })
    }

    /// Topic references in document order.
    pub fn spec_topics(&self) -> Vec<&SpecTopic> {
        let mut topics = Vec::new();
        self.collect_spec_topics(&mut topics);
        topics
    }

    fn collect_spec_topics<'a>(&'a self, topics: &mut Vec<&'a SpecTopic>) {
        for child in &self.children {
            match child {
                Node::Topic(topic) => topics.push(topic),
                Node::Level(level) => level.collect_spec_topics(topics),
            }
        }
    }

    pub fn unique_link_id(&self, use_fixed_urls: bool) -> String {
        level_link_id(
            self.level_type,
            &self.title,
            self.duplicate_id,
            self.step,
            use_fixed_urls,
        )
    }
}

/// Root of an authored book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSpec {
    pub id: Option<i64>,
    pub revision: Option<i64>,
    pub title: String,
    pub subtitle: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub edition: Option<String>,
    pub copyright_holder: Option<String>,
    pub abstract_text: Option<String>,
    pub locale: String,
    #[serde(default)]
    pub output_style: OutputStyle,
    pub brand: Option<String>,
    /// Extra lines appended to `publican.cfg`
    pub publican_cfg: Option<String>,
    #[serde(default)]
    pub injection: InjectionMode,
    #[serde(default)]
    pub injection_types: Vec<String>,
    pub base_level: Level,
    /// Authored text, reproduced verbatim in the content spec appendix
    pub source_text: Option<String>,
}

impl ContentSpec {
    pub fn new(title: impl Into<String>, locale: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: None,
            revision: None,
            base_level: Level::new(LevelType::Base, title.clone()),
            title,
            subtitle: None,
            product: None,
            version: None,
            edition: None,
            copyright_holder: None,
            abstract_text: None,
            locale: locale.into(),
            output_style: OutputStyle::default(),
            brand: None,
            publican_cfg: None,
            injection: InjectionMode::default(),
            injection_types: Vec::new(),
            source_text: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.base_level.children.push(Node::Level(level));
        self
    }
}

impl fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source_text {
            return write!(f, "{}", source);
        }

        if let Some(id) = self.id {
            writeln!(f, "ID = {}", id)?;
        }
        writeln!(f, "Title = {}", self.title)?;
        if let Some(subtitle) = &self.subtitle {
            writeln!(f, "Subtitle = {}", subtitle)?;
        }
        if let Some(product) = &self.product {
            writeln!(f, "Product = {}", product)?;
        }
        if let Some(version) = &self.version {
            writeln!(f, "Version = {}", version)?;
        }
        if let Some(brand) = &self.brand {
            writeln!(f, "Brand = {}", brand)?;
        }
        if self.output_style == OutputStyle::Skynet {
            writeln!(f, "Output Style = skynet")?;
        }
        writeln!(f)?;
        for child in &self.base_level.children {
            write_node(f, child, 0)?;
        }
        Ok(())
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node {
        Node::Level(level) => {
            writeln!(f, "{}{}: {}", indent, level.level_type, level.title)?;
            for child in &level.children {
                write_node(f, child, depth + 1)?;
            }
        }
        Node::Topic(topic) => {
            write!(f, "{}{} [{}", indent, topic.title, topic.topic_id)?;
            if let Some(revision) = topic.revision {
                write!(f, ", rev: {}", revision)?;
            }
            write!(f, "]")?;
            if let Some(target) = &topic.target_id {
                write!(f, " [{}]", target)?;
            }
            writeln!(f)?;
        }
    }
    Ok(())
}
