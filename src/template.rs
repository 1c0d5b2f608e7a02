//! Template rendering for book documents.
//!
//! The builder only depends on [`TemplateRenderer`]; [`TemplateEngine`] is the
//! built-in minijinja implementation carrying the default DocBook templates.

use minijinja::{AutoEscape, Environment, Value};
use quick_xml::escape::escape;
use serde::Serialize;

use crate::error::Result;

/// Named template variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TemplateContext(serde_json::Map<String, serde_json::Value>);

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`. Values that cannot be represented are stored as null.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.0.insert(key.to_string(), value);
    }

    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Renders a named template against a context.
pub trait TemplateRenderer {
    fn render(&self, name: &str, context: &TemplateContext) -> Result<String>;
}

pub const PREAMBLE_TEMPLATE: &str = "preamble.xml";
pub const TOPIC_TEMPLATE: &str = "topic.xml";
pub const EMPTY_TOPIC_TEMPLATE: &str = "empty_topic.xml";
pub const FAILED_INJECTION_TEMPLATE: &str = "failed_injection_topic.xml";
pub const FAILED_VALIDATION_TEMPLATE: &str = "failed_validation_topic.xml";
pub const CHAPTER_TEMPLATE: &str = "chapter.xml";
pub const BOOK_TEMPLATE: &str = "book.xml";
pub const BOOK_ENT_TEMPLATE: &str = "book.ent";
pub const BOOK_INFO_TEMPLATE: &str = "book_info.xml";
pub const AUTHOR_GROUP_TEMPLATE: &str = "author_group.xml";
pub const PREFACE_TEMPLATE: &str = "preface.xml";
pub const REVISION_HISTORY_TEMPLATE: &str = "revision_history.xml";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (PREAMBLE_TEMPLATE, include_str!("../templates/preamble.xml")),
    (TOPIC_TEMPLATE, include_str!("../templates/topic.xml")),
    (EMPTY_TOPIC_TEMPLATE, include_str!("../templates/empty_topic.xml")),
    (FAILED_INJECTION_TEMPLATE, include_str!("../templates/failed_injection_topic.xml")),
    (FAILED_VALIDATION_TEMPLATE, include_str!("../templates/failed_validation_topic.xml")),
    (CHAPTER_TEMPLATE, include_str!("../templates/chapter.xml")),
    (BOOK_TEMPLATE, include_str!("../templates/book.xml")),
    (BOOK_ENT_TEMPLATE, include_str!("../templates/book.ent")),
    (BOOK_INFO_TEMPLATE, include_str!("../templates/book_info.xml")),
    (AUTHOR_GROUP_TEMPLATE, include_str!("../templates/author_group.xml")),
    (PREFACE_TEMPLATE, include_str!("../templates/preface.xml")),
    (REVISION_HISTORY_TEMPLATE, include_str!("../templates/revision_history.xml")),
];

/// Escapes a value for use in XML text or attributes. Missing values render
/// as the empty string.
fn xml_filter(value: Value) -> String {
    if value.is_undefined() || value.is_none() {
        return String::new();
    }
    escape(value.to_string().as_str()).into_owned()
}

/// minijinja environment loaded with the DocBook templates.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        // content is assembled XML; escaping is explicit through `|xml`
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("xml", xml_filter);

        for &(name, source) in BUILTIN_TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(context)?)
    }
}
