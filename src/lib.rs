//! Docbook Forge
//!
//! Compiles content specifications into cross-referenced DocBook books laid
//! out for the Publican toolchain.

pub mod address;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod content_spec;
pub mod docbook;
pub mod error;
pub mod error_database;
pub mod injection;
pub mod registry;
pub mod store;
pub mod template;
pub mod topic;
pub mod translation;
pub mod unique_ids;
pub mod validation;
pub mod xml;

pub use address::{create_url_title, escape_title, FixedUrlAssigner};
pub use builder::{BookBuilder, BuildOutput, BuildStats, Manifest};
pub use cancel::CancellationToken;
pub use config::{BuildingOptions, InjectionMode, InjectionOptions};
pub use content_spec::{
    ContentSpec, Level, LevelType, Node, OutputStyle, Relationship, RelationshipKind, SpecTopic,
};
pub use error::{BuildError, Result, StoreError, XmlError};
pub use error_database::{ErrorDatabase, ErrorSeverity};
pub use injection::{InjectionReport, InjectionResolver, Marker, MarkerKind};
pub use registry::SpecDatabase;
pub use store::{AuthorInformation, InMemoryTopicStore, TopicStore};
pub use template::{TemplateContext, TemplateEngine, TemplateRenderer};
pub use topic::{BuildTopic, PropertyTag, Tag, Topic, TranslatedTopic};
pub use translation::TranslationCompleter;
pub use unique_ids::UniqueIdEnforcer;
pub use validation::{DtdValidator, ValidationResult, XmlValidator};
pub use xml::{Element, XmlDocument, XmlNode};
