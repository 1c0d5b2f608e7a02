use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use super::{AuthorInformation, TopicPropertyUpdate, TopicStore};
use crate::error::StoreError;
use crate::topic::{BuildTopic, Tag, Topic, TranslatedTopic};

/// Topic store held entirely in memory.
///
/// Property updates are applied to the stored topics and to every cached
/// relationship copy, the way a live store would return them on the next
/// fetch.
#[derive(Debug, Default)]
pub struct InMemoryTopicStore {
    topics: Mutex<BTreeMap<i64, Topic>>,
    translations: BTreeMap<(String, i64), TranslatedTopic>,
    strings: HashMap<i64, String>,
    blobs: HashMap<i64, Vec<u8>>,
    images: HashMap<i64, Vec<u8>>,
    authors: HashMap<i64, AuthorInformation>,
    tags: Vec<Tag>,
    failing_updates: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(self, topic: Topic) -> Self {
        if let Ok(mut topics) = self.topics.lock() {
            topics.insert(topic.id, topic);
        }
        self
    }

    /// Adds a translation keyed by its locale and source topic id.
    pub fn with_translation(mut self, translation: TranslatedTopic) -> Self {
        self.translations.insert(
            (translation.topic.locale.clone(), translation.topic_id),
            translation,
        );
        self
    }

    pub fn with_string_constant(mut self, id: i64, value: impl Into<String>) -> Self {
        self.strings.insert(id, value.into());
        self
    }

    pub fn with_blob_constant(mut self, id: i64, value: Vec<u8>) -> Self {
        self.blobs.insert(id, value);
        self
    }

    pub fn with_image(mut self, id: i64, bytes: Vec<u8>) -> Self {
        self.images.insert(id, bytes);
        self
    }

    /// Registers an author tag and the writer behind it.
    pub fn with_author(mut self, tag: Tag, author: AuthorInformation) -> Self {
        self.authors.insert(tag.id, author);
        self.tags.push(tag);
        self
    }

    /// Makes the next `count` property updates fail with a transient error.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Number of property update calls received, failed ones included.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored topic.
    pub fn topic(&self, id: i64) -> Option<Topic> {
        self.topics.lock().ok()?.get(&id).cloned()
    }

    fn lock_topics(&self) -> Result<MutexGuard<'_, BTreeMap<i64, Topic>>, StoreError> {
        self.topics
            .lock()
            .map_err(|_| StoreError::Transient("topic table lock poisoned".to_string()))
    }
}

fn apply_update(topic: &mut Topic, update: &TopicPropertyUpdate) {
    topic
        .properties
        .retain(|p| !(p.id == update.add.id && update.remove.contains(p)));
    topic.properties.retain(|p| p != &update.add);
    topic.properties.push(update.add.clone());
}

impl TopicStore for InMemoryTopicStore {
    fn topics(&self, ids: &[i64]) -> Result<Vec<Topic>, StoreError> {
        let topics = self.lock_topics()?;
        Ok(ids.iter().filter_map(|id| topics.get(id).cloned()).collect())
    }

    fn translated_topics(
        &self,
        ids: &[i64],
        locale: &str,
    ) -> Result<Vec<TranslatedTopic>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.translations.get(&(locale.to_string(), *id)).cloned())
            .collect())
    }

    fn topics_with_property(
        &self,
        property_id: i64,
        value: &str,
    ) -> Result<Vec<i64>, StoreError> {
        let topics = self.lock_topics()?;
        Ok(topics
            .values()
            .filter(|t| {
                t.properties
                    .iter()
                    .any(|p| p.id == property_id && p.value == value)
            })
            .map(|t| t.id)
            .collect())
    }

    fn update_topic_properties(&self, updates: &[TopicPropertyUpdate]) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.failing_updates.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_updates
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(StoreError::Transient("simulated update failure".to_string()));
        }

        let mut topics = self.lock_topics()?;
        for update in updates {
            let topic = topics
                .get_mut(&update.topic_id)
                .ok_or(StoreError::NotFound {
                    kind: "topic",
                    id: update.topic_id,
                })?;
            apply_update(topic, update);
            debug!(
                "Set property {} = {} on topic {}",
                update.add.id, update.add.value, update.topic_id
            );
        }

        for topic in topics.values_mut() {
            for related in topic.outgoing.iter_mut().chain(topic.incoming.iter_mut()) {
                if let BuildTopic::Plain(copy) = related {
                    if let Some(update) = updates.iter().find(|u| u.topic_id == copy.id) {
                        apply_update(copy, update);
                    }
                }
            }
        }
        Ok(())
    }

    fn string_constant(&self, id: i64) -> Result<String, StoreError> {
        self.strings
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "string constant",
                id,
            })
    }

    fn blob_constant(&self, id: i64) -> Result<Vec<u8>, StoreError> {
        self.blobs.get(&id).cloned().ok_or(StoreError::NotFound {
            kind: "blob constant",
            id,
        })
    }

    fn image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.images.get(&id).cloned())
    }

    fn author_information(&self, author_tag_id: i64) -> Result<Option<AuthorInformation>, StoreError> {
        Ok(self.authors.get(&author_tag_id).cloned())
    }

    fn tags_by_name(&self, name: &str) -> Result<Vec<Tag>, StoreError> {
        Ok(self.tags.iter().filter(|t| t.name == name).cloned().collect())
    }
}
