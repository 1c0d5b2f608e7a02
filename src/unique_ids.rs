//! Book-wide uniqueness of `id` attributes.
//!
//! Every topic document is authored on its own, so nothing stops two topics
//! (or two occurrences of the same topic) from using the same `id`. Ids are
//! recorded per topic before any rewriting, and every link id in the book is
//! reserved. Each occurrence then suffixes its ids with its duplicate number,
//! and with its step when the result still collides with a reserved id,
//! another topic's ids or an id already handed out. A further counter is
//! appended until the id is free.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::xml::{Element, XmlDocument, XmlNode};

#[derive(Debug, Default)]
pub struct UniqueIdEnforcer {
    by_topic: HashMap<i64, HashSet<String>>,
    /// Link ids and the final ids of every enforced occurrence
    taken: HashSet<String>,
}

/// `id` values below the root, in document order. The root's id is the
/// topic's link id and is managed by the builder.
fn inner_ids(doc: &XmlDocument) -> Vec<String> {
    let mut ids = Vec::new();
    for child in doc.root.child_elements() {
        child.visit_elements(&mut |e: &Element| {
            if let Some(id) = e.attribute("id") {
                ids.push(id.to_string());
            }
        });
    }
    ids
}

impl UniqueIdEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the ids of an unmodified topic document.
    pub fn record(&mut self, topic_id: i64, doc: &XmlDocument) {
        self.by_topic
            .entry(topic_id)
            .or_default()
            .extend(inner_ids(doc));
    }

    /// Marks an id that appears in the book outside of any topic's inner ids,
    /// such as a topic or level link id.
    pub fn reserve(&mut self, id: impl Into<String>) {
        self.taken.insert(id.into());
    }

    fn used_elsewhere(&self, topic_id: i64, id: &str) -> bool {
        self.by_topic
            .iter()
            .any(|(owner, ids)| *owner != topic_id && ids.contains(id))
    }

    fn is_free(&self, topic_id: i64, id: &str) -> bool {
        !self.taken.contains(id) && !self.used_elsewhere(topic_id, id)
    }

    /// Rewrites the ids of one topic occurrence and every attribute that
    /// referenced them. Returns the applied old → new mapping.
    pub fn enforce(
        &mut self,
        topic_id: i64,
        duplicate_id: Option<usize>,
        step: usize,
        doc: &mut XmlDocument,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>> {
        cancel.check()?;

        let originals = inner_ids(doc);
        let mut seen: HashSet<&String> = HashSet::new();
        let mut assigned: HashSet<String> = HashSet::new();
        let mut mapping = BTreeMap::new();
        for old in &originals {
            if !seen.insert(old) {
                continue;
            }
            let base = match duplicate_id {
                Some(dup) => format!("{}-{}", old, dup),
                None => old.clone(),
            };
            // without a duplicate suffix the other ids of this occurrence keep their names
            let clashes_locally = |candidate: &str| {
                assigned.contains(candidate)
                    || (duplicate_id.is_none() && candidate != old && originals.iter().any(|o| o == candidate))
            };
            let mut new = base.clone();
            let mut attempt = 0;
            while !self.is_free(topic_id, &new) || clashes_locally(&new) {
                attempt += 1;
                new = if attempt == 1 {
                    format!("{}-{}", base, step)
                } else {
                    format!("{}-{}-{}", base, step, attempt - 1)
                };
            }
            assigned.insert(new.clone());
            if new != *old {
                mapping.insert(old.clone(), new);
            }
        }
        self.taken.extend(assigned);
        if mapping.is_empty() {
            return Ok(mapping);
        }

        let rewrite = |e: &mut Element, skip_id: bool| {
            for (key, value) in e.attributes.iter_mut() {
                if skip_id && key.as_str() == "id" {
                    continue;
                }
                if let Some(new) = mapping.get(value.as_str()) {
                    *value = new.clone();
                }
            }
        };
        // the mapping is complete before anything is rewritten, so renames never chain
        rewrite(&mut doc.root, true);
        for child in doc.root.children.iter_mut() {
            if let XmlNode::Element(e) = child {
                e.visit_elements_mut(&mut |e: &mut Element| rewrite(e, false));
            }
        }
        Ok(mapping)
    }
}
