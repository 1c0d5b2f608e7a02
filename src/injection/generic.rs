//! Related-topic lists grouped by topic type.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::injection::resolver::{LinkTargets, RelatedLink};
use crate::topic::{
    BuildTopic, CONCEPTUAL_OVERVIEW_TAG_ID, CONCEPT_TAG_ID, REFERENCE_TAG_ID, TASK_TAG_ID,
};

/// A topic type: tag id, list title and list role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicType {
    pub tag_id: i64,
    pub label: &'static str,
    pub role: &'static str,
}

const TASK: TopicType = TopicType {
    tag_id: TASK_TAG_ID,
    label: "Task",
    role: "task",
};
const REFERENCE: TopicType = TopicType {
    tag_id: REFERENCE_TAG_ID,
    label: "Reference",
    role: "reference",
};
const CONCEPT: TopicType = TopicType {
    tag_id: CONCEPT_TAG_ID,
    label: "Concept",
    role: "concept",
};
const CONCEPTUAL_OVERVIEW: TopicType = TopicType {
    tag_id: CONCEPTUAL_OVERVIEW_TAG_ID,
    label: "Conceptual Overview",
    role: "conceptual-overview",
};

/// A related topic is filed under the first of these it is tagged with.
pub const CLASSIFICATION_ORDER: [TopicType; 4] = [TASK, REFERENCE, CONCEPT, CONCEPTUAL_OVERVIEW];

/// Order of the lists in the rendered topic.
pub const OUTPUT_ORDER: [TopicType; 4] = [REFERENCE, TASK, CONCEPT, CONCEPTUAL_OVERVIEW];

/// One rendered list of related topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedTopicList {
    pub label: String,
    pub role: String,
    pub links: Vec<RelatedLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericInjection {
    pub lists: Vec<RelatedTopicList>,
    /// Related topic ids that are not part of the build
    pub missing: Vec<i64>,
}

impl GenericInjection {
    pub fn error_message(&self) -> Option<String> {
        if self.missing.is_empty() {
            return None;
        }
        let ids = self
            .missing
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "Topic has related Topic(s) {} that were not included in the filter used to build this book.",
            ids
        ))
    }
}

/// Files the topic's outgoing relationships into typed lists, skipping ids
/// already linked from an injection marker.
pub fn generic_related_topics(
    topic: &BuildTopic,
    links: &dyn LinkTargets,
    claimed: &BTreeSet<i64>,
    ignore_missing: bool,
) -> GenericInjection {
    let mut injection = GenericInjection::default();
    let mut buckets: IndexMap<i64, Vec<RelatedLink>> = IndexMap::new();

    for related in topic.outgoing() {
        let topic_id = related.topic_id();
        if claimed.contains(&topic_id) {
            continue;
        }
        if !links.contains(topic_id) {
            if !ignore_missing {
                injection.missing.push(topic_id);
            }
            continue;
        }

        let Some(kind) = CLASSIFICATION_ORDER.iter().find(|t| related.has_tag(t.tag_id)) else {
            continue;
        };
        let Some(link) = links.link(topic_id) else {
            continue;
        };
        let title = links
            .title(topic_id)
            .unwrap_or_else(|| related.title().to_string());
        buckets
            .entry(kind.tag_id)
            .or_default()
            .push(RelatedLink { link, title });
    }

    for kind in OUTPUT_ORDER {
        if let Some(mut links) = buckets.shift_remove(&kind.tag_id) {
            links.sort_by(|a, b| a.title.cmp(&b.title));
            injection.lists.push(RelatedTopicList {
                label: kind.label.to_string(),
                role: kind.role.to_string(),
                links,
            });
        }
    }
    injection
}
