//! Lays out the Publican archive from a processed build.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Utc};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use quick_xml::escape::escape;
use regex::{Captures, Regex};
use serde::Serialize;

use super::{BookBuild, Manifest};
use crate::cancel::CancellationToken;
use crate::content_spec::{Level, LevelType, Node, OutputStyle, SpecTopic};
use crate::docbook::wrap_in_para;
use crate::error::Result;
use crate::error_database::ErrorSeverity;
use crate::registry::TopicStatus;
use crate::store::{
    AuthorInformation, TopicStore, ICON_SVG_STRING_ID, PUBLICAN_CFG_STRING_ID, SKYNET_BLOB_ASSETS,
    SKYNET_STRING_ASSETS,
};
use crate::template::{
    TemplateContext, TemplateRenderer, AUTHOR_GROUP_TEMPLATE, BOOK_ENT_TEMPLATE, BOOK_INFO_TEMPLATE,
    BOOK_TEMPLATE, CHAPTER_TEMPLATE, PREAMBLE_TEMPLATE, PREFACE_TEMPLATE, REVISION_HISTORY_TEMPLATE,
    TOPIC_TEMPLATE,
};
use crate::topic::WRITER_CATEGORY_ID;
use crate::xml::{clean_text_for_xml, wrap_in_cdata};

lazy_static! {
    static ref BRAND_PLACEHOLDER: Regex = Regex::new(r"<<contentSpec\.brand>>").unwrap();
    static ref XML_LANG_LINE: Regex = Regex::new(r"xml_lang:[^\r\n]*(\r\n|\n)?").unwrap();
}

pub const ERRORS_CHAPTER_ID: &str = "Compiler_Output";
pub const DEFAULT_BRAND: &str = "common";
pub const DEFAULT_COPYRIGHT_HOLDER: &str = "Red Hat, Inc.";
pub const DEFAULT_EDITION: &str = "1";
const REVISION_MESSAGE: &str = "Initial creation of book by publican";

/// One entry of the book or chapter outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum OutlineNode {
    Include {
        href: String,
    },
    Element {
        element: &'static str,
        id: String,
        title: String,
        children: Vec<OutlineNode>,
    },
}

impl OutlineNode {
    fn include(href: impl Into<String>) -> Self {
        OutlineNode::Include { href: href.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RevisionAuthor {
    first_name: String,
    last_name: String,
    email: String,
}

impl Default for RevisionAuthor {
    fn default() -> Self {
        Self {
            first_name: "Unknown".to_string(),
            last_name: "Writer".to_string(),
            email: "Unknown".to_string(),
        }
    }
}

/// Steps of the topic references that end up in the book: everything inside
/// a chapter-level container. References placed directly in the book or in a
/// part have nowhere to go.
pub(crate) fn outlined_steps(base_level: &Level) -> BTreeSet<usize> {
    let mut steps = BTreeSet::new();
    for child in &base_level.children {
        let Node::Level(level) = child else {
            continue;
        };
        match level.level_type {
            LevelType::Part => {
                for part_child in &level.children {
                    if let Node::Level(chapter) = part_child {
                        steps.extend(chapter.spec_topics().iter().map(|t| t.step));
                    }
                }
            }
            _ => steps.extend(level.spec_topics().iter().map(|t| t.step)),
        }
    }
    steps
}

pub(crate) struct Assembler<'x, S: TopicStore + ?Sized> {
    store: &'x S,
    templates: &'x dyn TemplateRenderer,
    build: &'x BookBuild<'x>,
    manifest: Manifest,
}

impl<'x, S: TopicStore + ?Sized> Assembler<'x, S> {
    pub fn new(store: &'x S, templates: &'x dyn TemplateRenderer, build: &'x BookBuild<'x>) -> Self {
        Self {
            store,
            templates,
            build,
            manifest: Manifest::new(),
        }
    }

    fn locale_path(&self, file: &str) -> String {
        format!("{}/{}/{}", self.build.escaped_title, self.build.locale, file)
    }

    fn base_context(&self, root_element: &str) -> TemplateContext {
        TemplateContext::new()
            .with("root_element", root_element)
            .with("escaped_book_title", &self.build.escaped_title)
    }

    fn render_into(&mut self, file: &str, template: &str, context: &TemplateContext) -> Result<()> {
        let rendered = self.templates.render(template, context)?;
        let path = self.locale_path(file);
        self.manifest.insert(path, rendered);
        Ok(())
    }

    pub fn assemble(mut self, images: &BTreeMap<String, Vec<u8>>, cancel: &CancellationToken) -> Result<Manifest> {
        info!("Assembling book \"{}\"", self.build.spec.title);
        cancel.check()?;

        self.publican_cfg()?;
        self.book_info()?;
        self.author_group()?;
        self.preface()?;
        self.revision_history()?;
        self.entities()?;
        self.assets()?;

        let mut levels = Vec::new();
        if !self.build.options.suppress_errors_page {
            self.errors_chapter()?;
            levels.push(OutlineNode::include("Errors.xml"));
        }

        cancel.check()?;
        let build = self.build;
        for child in &build.base_level.children {
            match child {
                Node::Level(level) => {
                    if let Some(node) = self.top_level(level)? {
                        levels.push(node);
                    }
                }
                Node::Topic(topic) => {
                    warn!(
                        "Topic {} is outside of any chapter and has been left out of the book",
                        topic.topic_id
                    );
                }
            }
        }

        self.topic_files(cancel)?;
        self.images(images, cancel)?;

        if !self.build.options.suppress_content_spec_page {
            self.content_spec_appendix()?;
            levels.push(OutlineNode::include("Build_Content_Specification.xml"));
        }

        let context = self.base_context("book").with("levels", &levels);
        let book_file = format!("{}.xml", self.build.escaped_title);
        self.render_into(&book_file, BOOK_TEMPLATE, &context)?;

        debug!("Assembled {} files", self.manifest.len());
        Ok(self.manifest)
    }

    fn publican_cfg(&mut self) -> Result<()> {
        let spec = self.build.spec;
        let base = self.store.string_constant(PUBLICAN_CFG_STRING_ID)?;
        let brand = spec.brand.as_deref().unwrap_or(DEFAULT_BRAND);
        let branded = BRAND_PLACEHOLDER.replace_all(&base, brand);

        let locale = &self.build.locale;
        let mut cfg = if XML_LANG_LINE.is_match(&branded) {
            XML_LANG_LINE
                .replace(&branded, |caps: &Captures| {
                    let ending = caps.get(1).map_or("", |m| m.as_str());
                    format!("xml_lang: {}{}", locale, ending)
                })
                .into_owned()
        } else {
            let mut cfg = branded.into_owned();
            if !cfg.is_empty() && !cfg.ends_with('\n') {
                cfg.push('\n');
            }
            cfg.push_str(&format!("xml_lang: {}\n", locale));
            cfg
        };

        let mut extra_lines = Vec::new();
        if let Some(extra) = spec.publican_cfg.as_deref().filter(|extra| !extra.trim().is_empty()) {
            extra_lines.push(extra.trim().to_string());
        }
        if self.build.options.publican_show_remarks {
            extra_lines.push("show_remarks: 1".to_string());
        }
        if let Some(cvs_pkg) = &self.build.options.cvs_pkg {
            extra_lines.push(format!("cvs_pkg: {}", cvs_pkg));
        }
        for line in extra_lines {
            if !cfg.is_empty() && !cfg.ends_with('\n') {
                cfg.push('\n');
            }
            cfg.push_str(&line);
            cfg.push('\n');
        }

        let path = format!("{}/publican.cfg", self.build.escaped_title);
        self.manifest.insert(path, cfg);
        Ok(())
    }

    /// A metadata value, with any caller override applied.
    fn metadata(&self, key: &str, value: Option<&str>) -> Option<String> {
        self.build
            .options
            .overrides
            .get(key)
            .map(String::as_str)
            .or(value)
            .map(str::to_string)
    }

    fn edition(&self) -> String {
        self.metadata("edition", self.build.spec.edition.as_deref())
            .unwrap_or_else(|| DEFAULT_EDITION.to_string())
    }

    fn book_info(&mut self) -> Result<()> {
        let spec = self.build.spec;
        let context = self
            .base_context("bookinfo")
            .with("title", &self.metadata("title", Some(spec.title.as_str())))
            .with("subtitle", &self.metadata("subtitle", spec.subtitle.as_deref()))
            .with("product", &self.metadata("product", spec.product.as_deref()))
            .with("version", &self.metadata("version", spec.version.as_deref()))
            .with("edition", &self.edition())
            .with("pubsnumber", &self.metadata("pubsnumber", None))
            .with("abstract", &self.metadata("abstract", spec.abstract_text.as_deref()));
        self.render_into("Book_Info.xml", BOOK_INFO_TEMPLATE, &context)
    }

    fn author_group(&mut self) -> Result<()> {
        let mut writers = IndexMap::new();
        for topic in &self.build.topics {
            for tag in topic.tags() {
                if tag.categories.contains(&WRITER_CATEGORY_ID) {
                    writers.entry(tag.id).or_insert_with(|| tag.name.clone());
                }
            }
        }

        let mut authors: Vec<AuthorInformation> = Vec::new();
        for (&tag_id, name) in &writers {
            match self.store.author_information(tag_id)? {
                Some(author) => authors.push(author),
                None => debug!("No author information for writer tag {} ({})", tag_id, name),
            }
        }

        let context = self.base_context("authorgroup").with("authors", &authors);
        self.render_into("Author_Group.xml", AUTHOR_GROUP_TEMPLATE, &context)
    }

    fn preface(&mut self) -> Result<()> {
        let context = self.base_context("preface");
        self.render_into("Preface.xml", PREFACE_TEMPLATE, &context)
    }

    fn requester(&self) -> Result<RevisionAuthor> {
        let Some(name) = self.build.requester else {
            return Ok(RevisionAuthor::default());
        };
        for tag in self.store.tags_by_name(name)? {
            if let Some(author) = self.store.author_information(tag.id)? {
                return Ok(RevisionAuthor {
                    first_name: author.first_name,
                    last_name: author.last_name,
                    email: author.email.unwrap_or_else(|| "Unknown".to_string()),
                });
            }
        }
        debug!("No author information for requester {}", name);
        Ok(RevisionAuthor::default())
    }

    fn revision_history(&mut self) -> Result<()> {
        let date = self.build.options.build_date.unwrap_or_else(Utc::now);
        let revnumber = format!("{}-{}", self.edition(), self.build.spec.revision.unwrap_or(0));
        let context = self
            .base_context("appendix")
            .with("revnumber", &revnumber)
            .with("date", &date.format("%a %b %d %Y").to_string())
            .with("author", &self.requester()?)
            .with("messages", &[REVISION_MESSAGE]);
        self.render_into("Revision_History.xml", REVISION_HISTORY_TEMPLATE, &context)
    }

    fn entities(&mut self) -> Result<()> {
        let spec = self.build.spec;
        let year = self.build.options.build_date.unwrap_or_else(Utc::now).year();
        let holder = self
            .metadata("holder", spec.copyright_holder.as_deref())
            .unwrap_or_else(|| DEFAULT_COPYRIGHT_HOLDER.to_string());
        let context = self
            .base_context("book")
            .with("product", &self.metadata("product", spec.product.as_deref()))
            .with("year", &year)
            .with("holder", &holder);
        let file = format!("{}.ent", self.build.escaped_title);
        self.render_into(&file, BOOK_ENT_TEMPLATE, &context)
    }

    fn assets(&mut self) -> Result<()> {
        let icon = self.store.string_constant(ICON_SVG_STRING_ID)?;
        let path = self.locale_path("images/icon.svg");
        self.manifest.insert(path, icon);

        if self.build.spec.output_style == OutputStyle::Skynet {
            for &(id, file) in SKYNET_STRING_ASSETS {
                let asset = self.store.string_constant(id)?;
                let path = self.locale_path(file);
                self.manifest.insert(path, asset);
            }
            for &(id, file) in SKYNET_BLOB_ASSETS {
                let asset = self.store.blob_constant(id)?;
                let path = self.locale_path(file);
                self.manifest.insert(path, asset);
            }
        }
        Ok(())
    }

    /// Outline node for a level directly below the book.
    fn top_level(&mut self, level: &Level) -> Result<Option<OutlineNode>> {
        if !level.has_spec_topics() {
            debug!("Skipping empty {} \"{}\"", level.level_type, level.title);
            return Ok(None);
        }
        let fixed = self.build.use_fixed_urls;
        match level.level_type {
            LevelType::Part => {
                let mut children = Vec::new();
                for child in &level.children {
                    match child {
                        Node::Level(chapter) if chapter.has_spec_topics() => {
                            children.push(self.chapter_file(chapter)?);
                        }
                        Node::Level(_) => {}
                        Node::Topic(topic) => warn!(
                            "Topic {} sits directly in part \"{}\" and has been left out of the book",
                            topic.topic_id, level.title
                        ),
                    }
                }
                Ok(Some(OutlineNode::Element {
                    element: level.level_type.element_name(),
                    id: level.unique_link_id(fixed),
                    title: level.title.clone(),
                    children,
                }))
            }
            _ => self.chapter_file(level).map(Some),
        }
    }

    /// Writes a chapter or appendix file and returns its include.
    fn chapter_file(&mut self, level: &Level) -> Result<OutlineNode> {
        let id = level.unique_link_id(self.build.use_fixed_urls);
        let children = self.outline_children(level);
        let root_element = level.level_type.element_name();
        let context = self
            .base_context(root_element)
            .with("element", root_element)
            .with("id", &id)
            .with("title", &level.title)
            .with("children", &children);
        let file = format!("{}.xml", id);
        self.render_into(&file, CHAPTER_TEMPLATE, &context)?;
        Ok(OutlineNode::include(file))
    }

    fn outline_children(&self, level: &Level) -> Vec<OutlineNode> {
        let fixed = self.build.use_fixed_urls;
        let mut children = Vec::new();
        for child in &level.children {
            match child {
                Node::Topic(topic) => children.push(OutlineNode::include(self.topic_href(topic))),
                Node::Level(section) if section.has_spec_topics() => {
                    children.push(OutlineNode::Element {
                        element: section.level_type.element_name(),
                        id: section.unique_link_id(fixed),
                        title: section.title.clone(),
                        children: self.outline_children(section),
                    });
                }
                Node::Level(_) => {}
            }
        }
        children
    }

    fn topic_href(&self, topic: &SpecTopic) -> String {
        let link_id = self
            .build
            .registry
            .entry(topic.step)
            .map(|entry| entry.unique_link_id(self.build.use_fixed_urls))
            .unwrap_or_else(|| format!("TopicID{}", topic.topic_id));
        format!("topics/{}.xml", link_id)
    }

    fn topic_files(&mut self, cancel: &CancellationToken) -> Result<()> {
        let preamble = self.templates.render(PREAMBLE_TEMPLATE, &self.base_context("section"))?;
        let build = self.build;
        let outlined = outlined_steps(&build.base_level);
        for entry in build.registry.entries() {
            cancel.check()?;
            if !outlined.contains(&entry.step) {
                continue;
            }
            let file = format!("topics/{}.xml", entry.unique_link_id(build.use_fixed_urls));
            let contents = match (&entry.status, &entry.document) {
                (TopicStatus::Valid, Some(doc)) => format!("{}\n{}", preamble.trim_end(), doc.root.to_xml()),
                (TopicStatus::Fallback { content }, _) => {
                    let context = entry
                        .context
                        .clone()
                        .unwrap_or_default()
                        .with("root_element", "section")
                        .with("escaped_book_title", &build.escaped_title)
                        .with("include_preamble", &true)
                        .with("content", content);
                    self.templates.render(TOPIC_TEMPLATE, &context)?
                }
                _ => {
                    warn!("Topic reference {} was never processed and has been left out", entry.step);
                    continue;
                }
            };
            let path = self.locale_path(&file);
            self.manifest.insert(path, contents);
        }
        Ok(())
    }

    fn images(&mut self, images: &BTreeMap<String, Vec<u8>>, cancel: &CancellationToken) -> Result<()> {
        for (name, bytes) in images {
            cancel.check()?;
            let path = self.locale_path(&format!("images/{}", name));
            self.manifest.insert(path, bytes.clone());
        }
        Ok(())
    }

    fn errors_chapter(&mut self) -> Result<()> {
        let build = self.build;
        let preamble = self.templates.render(PREAMBLE_TEMPLATE, &self.base_context("chapter"))?;

        let mut body = String::new();
        let entries = build.errors.errors(&build.locale);
        if entries.is_empty() {
            body.push_str(&format!("\t{}\n", wrap_in_para("No Errors Found")));
        }
        for data in entries {
            let topic = &data.topic;
            body.push_str(&format!(
                "\t<section id=\"{}\">\n\t\t<title>Topic ID {}, Revision {}</title>\n\t\t<itemizedlist>\n",
                escape(topic.error_xref_id.as_str()),
                topic.topic_id,
                topic.revision
            ));
            if !topic.tags.is_empty() {
                body.push_str(&format!(
                    "\t\t\t<listitem><para>INFO: {}</para></listitem>\n",
                    escape(topic.tags.as_str())
                ));
            }
            for severity in [ErrorSeverity::Error, ErrorSeverity::Warning] {
                for item in data.items_of(severity) {
                    body.push_str(&format!(
                        "\t\t\t<listitem><para>{}: {}</para></listitem>\n",
                        severity, item.message
                    ));
                }
            }
            body.push_str("\t\t</itemizedlist>\n\t</section>\n");
        }

        let chapter = format!(
            "{}\n<chapter id=\"{}\">\n\t<title>Compiler Output</title>\n{}</chapter>\n",
            preamble.trim_end(),
            ERRORS_CHAPTER_ID,
            body
        );
        let path = self.locale_path("Errors.xml");
        self.manifest.insert(path, clean_text_for_xml(&chapter));
        Ok(())
    }

    fn content_spec_appendix(&mut self) -> Result<()> {
        let preamble = self.templates.render(PREAMBLE_TEMPLATE, &self.base_context("appendix"))?;
        let appendix = format!(
            "{}\n<appendix id=\"appe-{}-Build_Content_Specification\">\n\t<title>Build Content Specification</title>\n\t<programlisting>{}</programlisting>\n</appendix>\n",
            preamble.trim_end(),
            escape(self.build.escaped_title.as_str()),
            wrap_in_cdata(&self.build.spec.to_string())
        );
        let path = self.locale_path("Build_Content_Specification.xml");
        self.manifest.insert(path, clean_text_for_xml(&appendix));
        Ok(())
    }
}
