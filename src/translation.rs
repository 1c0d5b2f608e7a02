//! Fills the gaps in a localized build.
//!
//! A translated book needs a translated topic for every referenced id. Topics
//! nobody has translated yet are replaced by placeholders built from the
//! source-language topic, flagged as dummies so the errors chapter can list
//! them.

use std::collections::HashMap;

use log::{debug, info};

use crate::cancel::CancellationToken;
use crate::error::{BuildError, Result, StoreError};
use crate::store::TopicStore;
use crate::topic::{BuildTopic, Topic, TranslatedTopic};

/// Ids in `required` that `found` has no translation for, in `required`
/// order and without repeats.
pub fn missing_ids(found: &[TranslatedTopic], required: &[i64]) -> Vec<i64> {
    let mut missing: Vec<i64> = Vec::new();
    for id in required {
        if !found.iter().any(|t| t.topic_id == *id) && !missing.contains(id) {
            missing.push(*id);
        }
    }
    missing
}

pub struct TranslationCompleter<'a, S: TopicStore + ?Sized> {
    store: &'a S,
    cancel: &'a CancellationToken,
}

impl<'a, S: TopicStore + ?Sized> TranslationCompleter<'a, S> {
    pub fn new(store: &'a S, cancel: &'a CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Fetches the translations of `required` and completes the set.
    pub fn fetch(&self, required: &[i64], locale: &str) -> Result<Vec<TranslatedTopic>> {
        let found = self.store.translated_topics(required, locale)?;
        self.complete(found, required, locale)
    }

    /// Returns one translated topic per id in `required`, synthesizing
    /// placeholders for the ids `found` lacks.
    pub fn complete(
        &self,
        found: Vec<TranslatedTopic>,
        required: &[i64],
        locale: &str,
    ) -> Result<Vec<TranslatedTopic>> {
        self.cancel.check()?;
        let missing = missing_ids(&found, required);

        let mut memo: HashMap<(String, i64), TranslatedTopic> = HashMap::new();
        for translation in found {
            memo.entry((locale.to_string(), translation.topic_id))
                .or_insert(translation);
        }

        if !missing.is_empty() {
            info!(
                "{} of {} topics have no {} translation, using placeholders",
                missing.len(),
                required.len(),
                locale
            );
            let sources: HashMap<i64, Topic> = self
                .store
                .topics(&missing)?
                .into_iter()
                .map(|t| (t.id, t))
                .collect();
            for id in &missing {
                self.cancel.check()?;
                if let Some(source) = sources.get(id) {
                    self.synthesize(source, locale, &sources, &mut memo);
                }
            }
        }

        let mut completed = Vec::with_capacity(required.len());
        for id in required {
            match memo.get(&(locale.to_string(), *id)) {
                Some(translation) => completed.push(translation.clone()),
                None => {
                    return Err(BuildError::Store(StoreError::NotFound {
                        kind: "topic",
                        id: *id,
                    }))
                }
            }
        }
        Ok(completed)
    }

    fn synthesize(
        &self,
        source: &Topic,
        locale: &str,
        sources: &HashMap<i64, Topic>,
        memo: &mut HashMap<(String, i64), TranslatedTopic>,
    ) -> TranslatedTopic {
        let key = (locale.to_string(), source.id);
        if let Some(existing) = memo.get(&key) {
            return existing.clone();
        }
        debug!("Creating placeholder translation for topic {}", source.id);

        let mut placeholder = TranslatedTopic {
            topic: Topic {
                id: -source.id,
                revision: source.revision,
                title: format!("[{}] {}", source.locale, source.title),
                xml: source.xml.clone(),
                locale: locale.to_string(),
                tags: source.tags.clone(),
                properties: source.properties.clone(),
                outgoing: Vec::new(),
                incoming: Vec::new(),
            },
            topic_id: source.id,
            topic_revision: source.revision,
            translation_percentage: 100,
            dummy: true,
        };
        // visible to cycles through the relationship lists below
        memo.insert(key.clone(), placeholder.clone());

        placeholder.topic.outgoing = source
            .outgoing
            .iter()
            .map(|related| self.translate_related(related, locale, sources, memo))
            .collect();
        placeholder.topic.incoming = source
            .incoming
            .iter()
            .map(|related| self.translate_related(related, locale, sources, memo))
            .collect();

        memo.insert(key, placeholder.clone());
        placeholder
    }

    fn translate_related(
        &self,
        related: &BuildTopic,
        locale: &str,
        sources: &HashMap<i64, Topic>,
        memo: &mut HashMap<(String, i64), TranslatedTopic>,
    ) -> BuildTopic {
        if let Some(existing) = memo.get(&(locale.to_string(), related.topic_id())) {
            return BuildTopic::Translated(existing.shallow());
        }
        match related {
            BuildTopic::Translated(t) => BuildTopic::Translated(t.shallow()),
            BuildTopic::Plain(t) => {
                // prefer the fetched source so the placeholder keeps its own relationships
                let source = sources.get(&t.id).unwrap_or(t);
                BuildTopic::Translated(self.synthesize(source, locale, sources, memo).shallow())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTopicStore;

    fn translation(source: &Topic, percentage: u8) -> TranslatedTopic {
        let mut topic = Topic::new(source.id + 1000, format!("{} (de)", source.title), "<section><title>x</title></section>");
        topic.locale = "de-DE".to_string();
        TranslatedTopic {
            topic,
            topic_id: source.id,
            topic_revision: source.revision,
            translation_percentage: percentage,
            dummy: false,
        }
    }

    #[test]
    fn test_missing_ids_keep_order() {
        let a = Topic::new(1, "A", "");
        let found = vec![translation(&a, 100)];
        assert_eq!(missing_ids(&found, &[3, 1, 2, 3]), vec![3, 2]);
    }

    #[test]
    fn test_placeholders_fill_gaps() {
        let a = Topic::new(1, "Alpha", "<section><title>Alpha</title></section>");
        let b = Topic::new(2, "Beta", "<section><title>Beta</title></section>");
        let store = InMemoryTopicStore::new()
            .with_topic(a.clone())
            .with_topic(b.clone())
            .with_translation(translation(&a, 80));
        let cancel = CancellationToken::new();

        let topics = TranslationCompleter::new(&store, &cancel)
            .fetch(&[2, 1], "de-DE")
            .unwrap();
        assert_eq!(topics.len(), 2);

        let placeholder = &topics[0];
        assert!(placeholder.dummy);
        assert_eq!(placeholder.topic.id, -2);
        assert_eq!(placeholder.topic_id, 2);
        assert_eq!(placeholder.topic.title, "[en-US] Beta");
        assert_eq!(placeholder.topic.locale, "de-DE");
        assert_eq!(placeholder.translation_percentage, 100);

        assert!(!topics[1].dummy);
        assert_eq!(topics[1].translation_percentage, 80);
    }

    #[test]
    fn test_relationship_cycles_terminate() {
        let mut a = Topic::new(1, "A", "");
        let mut b = Topic::new(2, "B", "");
        a.relate_to(&mut b);
        b.relate_to(&mut a);
        let store = InMemoryTopicStore::new().with_topic(a).with_topic(b);
        let cancel = CancellationToken::new();

        let topics = TranslationCompleter::new(&store, &cancel)
            .fetch(&[1, 2], "fr-FR")
            .unwrap();
        let a = BuildTopic::Translated(topics[0].clone());
        assert!(a.is_related_to(2));
        let related = a.related_topic(2).unwrap();
        assert!(related.is_dummy());
        assert!(related.outgoing().is_empty());

        let b = BuildTopic::Translated(topics[1].clone());
        assert!(b.is_related_to(1));
        assert!(b.incoming().iter().any(|t| t.topic_id() == 1));
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let store = InMemoryTopicStore::new();
        let cancel = CancellationToken::new();
        let result = TranslationCompleter::new(&store, &cancel).fetch(&[7], "de-DE");
        assert!(matches!(
            result,
            Err(BuildError::Store(StoreError::NotFound { id: 7, .. }))
        ));
    }
}
