//! Relationship lists declared in the content spec itself.

use serde::Serialize;

use crate::content_spec::RelationshipKind;
use crate::injection::resolver::{Link, RelatedLink};
use crate::registry::{SpecDatabase, TargetRef};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpecRelationships {
    pub prerequisites: Vec<RelatedLink>,
    pub see_also: Vec<RelatedLink>,
    pub previous_steps: Vec<RelatedLink>,
    pub next_steps: Vec<RelatedLink>,
    /// The enclosing level, set when the topic is part of a process
    pub process_link: Option<RelatedLink>,
}

impl SpecRelationships {
    /// Collects the relationships of the topic reference at `step`.
    /// Targets that do not resolve are skipped.
    pub fn collect(registry: &SpecDatabase, step: usize, use_fixed_urls: bool) -> Self {
        let mut relationships = Self::default();
        let Some(entry) = registry.entry(step) else {
            return relationships;
        };

        for relationship in &entry.relationships {
            let Some(link) = resolve(registry, &relationship.target, use_fixed_urls) else {
                continue;
            };
            match relationship.kind {
                RelationshipKind::Prerequisite => relationships.prerequisites.push(link),
                RelationshipKind::Related => relationships.see_also.push(link),
                RelationshipKind::Previous => relationships.previous_steps.push(link),
                RelationshipKind::Next => relationships.next_steps.push(link),
            }
        }

        if !relationships.previous_steps.is_empty() || !relationships.next_steps.is_empty() {
            relationships.process_link = registry.level(entry.parent_level).map(|level| RelatedLink {
                link: Link::XRef(level.unique_link_id(use_fixed_urls)),
                title: level.title.clone(),
            });
        }
        relationships
    }

    pub fn apply_to(&self, context: &mut TemplateContext) {
        if !self.prerequisites.is_empty() {
            context.insert("prerequisites", &self.prerequisites);
        }
        if !self.see_also.is_empty() {
            context.insert("see_also", &self.see_also);
        }
        if let Some(process_link) = &self.process_link {
            context.insert("process_link", process_link);
            if !self.previous_steps.is_empty() {
                context.insert("previous_steps", &self.previous_steps);
            }
            if !self.next_steps.is_empty() {
                context.insert("next_steps", &self.next_steps);
            }
        }
    }
}

fn resolve(registry: &SpecDatabase, target: &str, use_fixed_urls: bool) -> Option<RelatedLink> {
    match registry.resolve_target(target)? {
        TargetRef::Topic(step) => {
            let entry = registry.entry(step)?;
            Some(RelatedLink {
                link: Link::XRef(entry.unique_link_id(use_fixed_urls)),
                title: entry.display_title().to_string(),
            })
        }
        TargetRef::Level(index) => {
            let level = registry.level(index)?;
            Some(RelatedLink {
                link: Link::XRef(level.unique_link_id(use_fixed_urls)),
                title: level.title.clone(),
            })
        }
    }
}
