//! Replaces injection markers in a topic document.

use std::collections::BTreeSet;

use log::{debug, warn};
use serde::Serialize;

use crate::docbook;
use crate::injection::marker::{Marker, MarkerId, MarkerKind};
use crate::registry::SpecDatabase;
use crate::topic::BuildTopic;
use crate::xml::{Element, XmlDocument, XmlNode};

pub const NO_INJECT_ROLE: &str = "noinject";

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "lowercase")]
pub enum Link {
    /// Cross reference to an id inside the book
    XRef(String),
    /// External URL
    ULink(String),
}

impl Link {
    pub fn to_element(&self, title: &str) -> Element {
        match self {
            Link::XRef(target) => docbook::xref(target),
            Link::ULink(url) => docbook::ulink(url, title),
        }
    }
}

/// A link together with the title shown for external links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedLink {
    pub link: Link,
    pub title: String,
}

/// Resolves topic ids to link targets.
pub trait LinkTargets {
    /// Whether the topic takes part in the build.
    fn contains(&self, topic_id: i64) -> bool;

    fn link(&self, topic_id: i64) -> Option<Link>;

    /// Title to show for the topic, when the targets know a better one than
    /// the related copy's.
    fn title(&self, _topic_id: i64) -> Option<String> {
        None
    }
}

/// Links into the book being built, pointing at the occurrence nearest to
/// the referencing topic.
pub struct BookLinks<'a> {
    registry: &'a SpecDatabase,
    use_fixed_urls: bool,
    from_step: usize,
}

impl<'a> BookLinks<'a> {
    pub fn new(registry: &'a SpecDatabase, use_fixed_urls: bool, from_step: usize) -> Self {
        Self {
            registry,
            use_fixed_urls,
            from_step,
        }
    }
}

impl LinkTargets for BookLinks<'_> {
    fn contains(&self, topic_id: i64) -> bool {
        self.registry.contains_topic(topic_id)
    }

    fn link(&self, topic_id: i64) -> Option<Link> {
        self.registry
            .closest_occurrence(topic_id, self.from_step)
            .map(|entry| Link::XRef(entry.unique_link_id(self.use_fixed_urls)))
    }

    fn title(&self, topic_id: i64) -> Option<String> {
        self.registry
            .closest_occurrence(topic_id, self.from_step)
            .map(|entry| entry.display_title().to_string())
    }
}

/// Links for a topic rendered outside any book.
pub struct StandaloneLinks {
    base_url: String,
}

impl StandaloneLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl LinkTargets for StandaloneLinks {
    fn contains(&self, _topic_id: i64) -> bool {
        true
    }

    fn link(&self, topic_id: i64) -> Option<Link> {
        Some(Link::ULink(format!("{}{}", self.base_url, topic_id)))
    }
}

/// Outcome of processing one topic's markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Ids linked from markers; left out of the generic related lists
    pub claimed: BTreeSet<i64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl InjectionReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct Unresolved {
    links: Vec<MarkerId>,
    text: Vec<MarkerId>,
    titles: Vec<MarkerId>,
}

impl Unresolved {
    fn bucket(&mut self, kind: MarkerKind) -> &mut Vec<MarkerId> {
        match kind {
            MarkerKind::Text => &mut self.text,
            MarkerKind::Title => &mut self.titles,
            _ => &mut self.links,
        }
    }
}

fn join_ids(ids: &[MarkerId]) -> String {
    ids.iter()
        .map(|id| id.topic_id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct InjectionResolver<'a> {
    links: &'a dyn LinkTargets,
    ignore_missing: bool,
}

impl<'a> InjectionResolver<'a> {
    pub fn new(links: &'a dyn LinkTargets, ignore_missing: bool) -> Self {
        Self {
            links,
            ignore_missing,
        }
    }

    /// Substitutes every marker in `doc`. Unresolvable markers are left in
    /// place unless missing injections are tolerated.
    pub fn process(&self, topic: &BuildTopic, doc: &mut XmlDocument) -> InjectionReport {
        let mut report = InjectionReport::default();
        let mut unresolved = Unresolved::default();

        doc.root.replace_comments(&mut |_, body| {
            let marker = Marker::parse(body)?;
            debug!(
                "Topic {}: processing {} marker",
                topic.topic_id(),
                marker.kind
            );
            self.substitute(topic, &marker, &mut report, &mut unresolved)
        });

        let messages = [
            (
                &unresolved.links,
                "Topic has referenced Topic(s) {} in a custom injection point that was either not related, or not included in the filter used to build this book.",
            ),
            (
                &unresolved.text,
                "Topic has injected content from Topic(s) {} that were not related.",
            ),
            (
                &unresolved.titles,
                "Topic has injected a title from Topic(s) {} that were not related.",
            ),
        ];
        for (ids, template) in messages {
            if self.ignore_missing {
                let required: Vec<MarkerId> = ids.iter().filter(|id| !id.optional).copied().collect();
                if !required.is_empty() {
                    report.warnings.push(template.replace("{}", &join_ids(&required)));
                }
            } else if !ids.is_empty() {
                report.errors.push(template.replace("{}", &join_ids(ids)));
            }
        }
        report
    }

    fn substitute(
        &self,
        topic: &BuildTopic,
        marker: &Marker,
        report: &mut InjectionReport,
        unresolved: &mut Unresolved,
    ) -> Option<Vec<XmlNode>> {
        let mut resolved: Vec<(MarkerId, &BuildTopic)> = Vec::new();
        let mut missing = Vec::new();

        for id in &marker.ids {
            if marker.kind.is_link() {
                report.claimed.insert(id.topic_id);
            }
            let related = topic.related_topic(id.topic_id);
            match related {
                Some(related) if !marker.kind.is_link() || self.links.contains(id.topic_id) => {
                    resolved.push((*id, related));
                }
                _ => missing.push(*id),
            }
        }

        let bucket = unresolved.bucket(marker.kind);
        bucket.extend(missing.iter().copied());
        if !missing.is_empty() && !self.ignore_missing {
            return None;
        }

        let nodes = match marker.kind {
            MarkerKind::Text => resolved
                .first()
                .map(|(_, related)| self.injected_text(related))
                .unwrap_or_default(),
            MarkerKind::Title => resolved
                .first()
                .map(|(_, related)| vec![docbook::title(related.title()).into()])
                .unwrap_or_default(),
            kind => self.link_nodes(kind, resolved),
        };
        Some(nodes)
    }

    fn link_nodes(&self, kind: MarkerKind, mut resolved: Vec<(MarkerId, &BuildTopic)>) -> Vec<XmlNode> {
        if kind == MarkerKind::AlphaSortList {
            resolved.sort_by(|a, b| a.1.title().cmp(b.1.title()));
        }

        let links: Vec<Vec<XmlNode>> = resolved
            .iter()
            .filter_map(|(id, related)| {
                let link = self.links.link(id.topic_id)?;
                Some(docbook::prefixed_link(link.to_element(related.title()), id.optional))
            })
            .collect();
        if links.is_empty() {
            return Vec::new();
        }

        match kind {
            MarkerKind::Single => links.into_iter().flatten().collect(),
            MarkerKind::ListItems => links
                .into_iter()
                .map(|link| docbook::list_item(link).into())
                .collect(),
            MarkerKind::Sequence => {
                let items = links.into_iter().map(docbook::list_item).collect();
                vec![docbook::ordered_list(items).into()]
            }
            _ => {
                let items = links.into_iter().map(docbook::list_item).collect();
                vec![docbook::itemized_list(items).into()]
            }
        }
    }

    fn injected_text(&self, related: &BuildTopic) -> Vec<XmlNode> {
        let mut doc = match XmlDocument::parse(related.xml()) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "Unable to inject content from topic {}: {}",
                    related.topic_id(),
                    e
                );
                return Vec::new();
            }
        };
        doc.root.remove_first_child("title");
        doc.root.retain_elements(&|e: &Element| !has_no_inject_role(e));
        doc.root.children
    }
}

fn has_no_inject_role(element: &Element) -> bool {
    element
        .attribute("role")
        .is_some_and(|roles| roles.split(',').any(|role| role == NO_INJECT_ROLE))
}
