//! Injection of links and content into topic documents.
//!
//! Topics mark injection points with XML comments (see [`marker`]), which the
//! [`resolver`] replaces with links to, or content from, related topics.
//! Related topics not claimed by a marker end up in the typed lists built by
//! [`generic`], or, for content-spec driven books, in the lists declared by
//! the content spec's own [`relationships`].

pub mod generic;
pub mod marker;
pub mod relationships;
pub mod resolver;

pub use generic::{generic_related_topics, GenericInjection, RelatedTopicList};
pub use marker::{Marker, MarkerId, MarkerKind};
pub use relationships::SpecRelationships;
pub use resolver::{BookLinks, InjectionReport, InjectionResolver, Link, LinkTargets, RelatedLink, StandaloneLinks};
