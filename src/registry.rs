//! Registry of every level and topic reference taking part in a build.
//!
//! The content spec tree stays structural; everything the passes learn about
//! a topic reference (fetched topic, parsed XML, render context) is kept here,
//! keyed by the reference's step.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use log::debug;

use crate::address::create_url_title;
use crate::cancel::CancellationToken;
use crate::content_spec::{level_link_id, Level, LevelType, Node, Relationship, SpecTopic};
use crate::error::Result;
use crate::template::TemplateContext;
use crate::topic::BuildTopic;
use crate::xml::XmlDocument;

/// How a topic reference will be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TopicStatus {
    #[default]
    Pending,
    /// Rendered from its processed XML document
    Valid,
    /// Rendered from a fallback template body
    Fallback { content: String },
}

/// Build state of one topic reference.
#[derive(Debug, Clone)]
pub struct SpecTopicEntry {
    pub step: usize,
    pub spec_id: String,
    pub topic_id: i64,
    pub title: String,
    pub duplicate_id: Option<usize>,
    /// Index of the enclosing level in [`SpecDatabase::levels`]
    pub parent_level: usize,
    pub relationships: Vec<Relationship>,
    pub topic: Option<BuildTopic>,
    pub document: Option<XmlDocument>,
    pub context: Option<TemplateContext>,
    pub status: TopicStatus,
}

impl SpecTopicEntry {
    /// Link id of this occurrence: the topic's address plus the duplicate
    /// suffix.
    pub fn unique_link_id(&self, use_fixed_urls: bool) -> String {
        let base = match &self.topic {
            Some(topic) => topic.link_id(use_fixed_urls),
            None => format!("TopicID{}", self.topic_id),
        };
        match self.duplicate_id {
            Some(dup) => format!("{}-{}", base, dup),
            None => base,
        }
    }

    /// Title to show in links: the fetched topic's, else the authored one.
    pub fn display_title(&self) -> &str {
        self.topic
            .as_ref()
            .map(|t| t.title())
            .unwrap_or(self.title.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LevelEntry {
    pub step: usize,
    pub level_type: LevelType,
    pub title: String,
    pub escaped_title: String,
    pub duplicate_id: Option<usize>,
    pub target_id: Option<String>,
    pub parent: Option<usize>,
}

impl LevelEntry {
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

/// What a relationship target id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRef {
    /// A topic reference, by step
    Topic(usize),
    /// A level, by index
    Level(usize),
}

#[derive(Debug, Default)]
pub struct SpecDatabase {
    /// Topic id to the steps of its occurrences, in first-seen order
    occurrences: IndexMap<i64, Vec<usize>>,
    entries: BTreeMap<usize, SpecTopicEntry>,
    levels: Vec<LevelEntry>,
    levels_by_title: HashMap<String, Vec<usize>>,
    targets: HashMap<String, TargetRef>,
    next_step: usize,
}

impl SpecDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `level` and everything below it, assigning steps and
    /// duplicate suffixes to the tree in place.
    pub fn register(&mut self, level: &mut Level, cancel: &CancellationToken) -> Result<()> {
        self.register_level(level, None, cancel)?;
        debug!(
            "Registered {} levels and {} topic references",
            self.levels.len(),
            self.entries.len()
        );
        Ok(())
    }

    fn register_level(
        &mut self,
        level: &mut Level,
        parent: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        cancel.check()?;
        self.next_step += 1;
        level.step = self.next_step;

        let escaped_title = create_url_title(&level.title);
        let index = self.levels.len();
        if level.level_type != LevelType::Base {
            let bucket = self.levels_by_title.entry(escaped_title.clone()).or_default();
            level.duplicate_id = if bucket.is_empty() {
                None
            } else {
                Some(bucket.len())
            };
            bucket.push(index);
        }
        if let Some(target) = &level.target_id {
            self.targets.insert(target.clone(), TargetRef::Level(index));
        }
        self.levels.push(LevelEntry {
            step: level.step,
            level_type: level.level_type,
            title: level.title.clone(),
            escaped_title,
            duplicate_id: level.duplicate_id,
            target_id: level.target_id.clone(),
            parent,
        });

        for child in &mut level.children {
            cancel.check()?;
            match child {
                Node::Level(child) => {
                    self.register_level(child, Some(index), cancel)?;
                }
                Node::Topic(topic) => self.register_topic(topic, index),
            }
        }
        Ok(index)
    }

    fn register_topic(&mut self, topic: &mut SpecTopic, parent_level: usize) {
        self.next_step += 1;
        topic.step = self.next_step;

        let steps = self.occurrences.entry(topic.topic_id).or_default();
        topic.duplicate_id = if steps.is_empty() {
            None
        } else {
            Some(steps.len())
        };
        steps.push(topic.step);

        self.targets
            .entry(topic.id.clone())
            .or_insert(TargetRef::Topic(topic.step));
        if let Some(target) = &topic.target_id {
            self.targets.insert(target.clone(), TargetRef::Topic(topic.step));
        }

        self.entries.insert(
            topic.step,
            SpecTopicEntry {
                step: topic.step,
                spec_id: topic.id.clone(),
                topic_id: topic.topic_id,
                title: topic.title.clone(),
                duplicate_id: topic.duplicate_id,
                parent_level,
                relationships: topic.relationships.clone(),
                topic: None,
                document: None,
                context: None,
                status: TopicStatus::Pending,
            },
        );
    }

    /// Distinct topic ids in first-seen order.
    pub fn topic_ids(&self) -> Vec<i64> {
        self.occurrences.keys().copied().collect()
    }

    pub fn contains_topic(&self, topic_id: i64) -> bool {
        self.occurrences.contains_key(&topic_id)
    }

    /// Whether the topic is referenced exactly once.
    pub fn is_unique(&self, topic_id: i64) -> bool {
        self.occurrences
            .get(&topic_id)
            .is_some_and(|steps| steps.len() == 1)
    }

    /// Steps of every occurrence of `topic_id`.
    pub fn steps_for(&self, topic_id: i64) -> Vec<usize> {
        self.occurrences.get(&topic_id).cloned().unwrap_or_default()
    }

    pub fn topics_for(&self, topic_id: i64) -> Vec<&SpecTopicEntry> {
        self.occurrences
            .get(&topic_id)
            .map(|steps| steps.iter().filter_map(|s| self.entries.get(s)).collect())
            .unwrap_or_default()
    }

    pub fn levels_for(&self, escaped_title: &str) -> Vec<&LevelEntry> {
        self.levels_by_title
            .get(escaped_title)
            .map(|indexes| indexes.iter().filter_map(|i| self.levels.get(*i)).collect())
            .unwrap_or_default()
    }

    /// The occurrence of `topic_id` nearest to `from_step`, earlier first on
    /// ties.
    pub fn closest_occurrence(&self, topic_id: i64, from_step: usize) -> Option<&SpecTopicEntry> {
        let steps = self.occurrences.get(&topic_id)?;
        let step = steps
            .iter()
            .min_by_key(|s| (s.abs_diff(from_step), **s))?;
        self.entries.get(step)
    }

    pub fn resolve_target(&self, target: &str) -> Option<TargetRef> {
        self.targets.get(target).copied()
    }

    pub fn entry(&self, step: usize) -> Option<&SpecTopicEntry> {
        self.entries.get(&step)
    }

    pub fn entry_mut(&mut self, step: usize) -> Option<&mut SpecTopicEntry> {
        self.entries.get_mut(&step)
    }

    /// Every topic reference in document order.
    pub fn entries(&self) -> impl Iterator<Item = &SpecTopicEntry> {
        self.entries.values()
    }

    pub fn steps(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }

    pub fn level(&self, index: usize) -> Option<&LevelEntry> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[LevelEntry] {
        &self.levels
    }

    pub fn context(&self, step: usize) -> Option<&TemplateContext> {
        self.entries.get(&step).and_then(|e| e.context.as_ref())
    }

    pub fn set_context(&mut self, step: usize, context: TemplateContext) {
        if let Some(entry) = self.entries.get_mut(&step) {
            entry.context = Some(context);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
