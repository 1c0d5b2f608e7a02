//! Compiles a content spec into a Publican book.
//!
//! [`BookBuilder::build`] drives the passes in order: registration, topic
//! fetching (with stable addressing or translation completion), the topic
//! pass, the topic reference pass, image relocation and finally assembly of the
//! archive manifest.

mod assembly;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use quick_xml::escape::escape;

use crate::address::{escape_title, FixedUrlAssigner};
use crate::cancel::CancellationToken;
use crate::config::{BuildingOptions, InjectionOptions};
use crate::content_spec::{ContentSpec, Level, OutputStyle};
use crate::error::{BuildError, Result, StoreError};
use crate::error_database::{ErrorDatabase, ErrorSeverity};
use crate::injection::{generic_related_topics, BookLinks, InjectionReport, InjectionResolver, SpecRelationships};
use crate::registry::{SpecDatabase, TopicStatus};
use crate::store::{TopicStore, DOCBOOK_DTD_BLOB_ID, FAILPENGUIN_PNG_BLOB_ID};
use crate::template::{
    TemplateContext, TemplateEngine, TemplateRenderer, EMPTY_TOPIC_TEMPLATE,
    FAILED_INJECTION_TEMPLATE, FAILED_VALIDATION_TEMPLATE, TOPIC_TEMPLATE,
};
use crate::topic::{
    BuildTopic, BUG_ASSIGNED_TO_PROPERTY_TAG_ID, BUG_COMPONENT_PROPERTY_TAG_ID,
    BUG_KEYWORDS_PROPERTY_TAG_ID, BUG_PRODUCT_PROPERTY_TAG_ID, BUG_VERSION_PROPERTY_TAG_ID,
};
use crate::translation::TranslationCompleter;
use crate::unique_ids::UniqueIdEnforcer;
use crate::validation::{DtdValidator, XmlValidator};
use crate::xml::{wrap_in_cdata, Element, XmlDocument};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Distinct topics fetched
    pub topics: usize,
    /// Topic references in the content spec, duplicates included
    pub spec_topics: usize,
    pub errors: usize,
    pub warnings: usize,
    pub images: usize,
    /// False when stable addressing failed and `TopicID` links were used
    pub used_fixed_urls: bool,
    pub build_time: Duration,
}

/// Archive contents: path relative to the archive root to file bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    files: BTreeMap<String, Vec<u8>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// File contents as text, if present and valid UTF-8.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub manifest: Manifest,
    pub stats: BuildStats,
}

/// State of one build, shared by the passes.
pub(crate) struct BookBuild<'b> {
    pub spec: &'b ContentSpec,
    pub options: &'b BuildingOptions,
    /// Registered copy of the content spec tree, with steps and duplicate ids
    pub base_level: Level,
    pub registry: SpecDatabase,
    pub errors: ErrorDatabase,
    pub topics: Vec<BuildTopic>,
    pub use_fixed_urls: bool,
    pub locale: String,
    pub escaped_title: String,
    pub requester: Option<&'b str>,
}

impl BookBuild<'_> {
    fn fallback_context(&self, topic: &BuildTopic) -> TemplateContext {
        TemplateContext::new()
            .with("topic_id", &topic.topic_id())
            .with("show_errors_page", &!self.options.suppress_errors_page)
            .with("topic_error_xref", &topic.error_xref_id())
    }
}

pub struct BookBuilder<'a, S: TopicStore + ?Sized> {
    store: &'a S,
    templates: Box<dyn TemplateRenderer + 'a>,
    validator: Box<dyn XmlValidator + 'a>,
    cancel: CancellationToken,
}

impl<'a, S: TopicStore + ?Sized> BookBuilder<'a, S> {
    pub fn new(store: &'a S) -> Result<Self> {
        Ok(Self {
            store,
            templates: Box::new(TemplateEngine::new()?),
            validator: Box::new(DtdValidator::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_templates(mut self, templates: impl TemplateRenderer + 'a) -> Self {
        self.templates = Box::new(templates);
        self
    }

    pub fn with_validator(mut self, validator: impl XmlValidator + 'a) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts a running build when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Builds the book. `requester` names the user the revision history is
    /// attributed to.
    pub fn build(
        &self,
        spec: &ContentSpec,
        options: &BuildingOptions,
        requester: Option<&str>,
    ) -> Result<BuildOutput> {
        let start_time = Instant::now();
        options.validate()?;
        info!("Starting build of \"{}\"", spec.title);
        self.cancel.check()?;

        let mut base_level = spec.base_level.clone();
        let mut registry = SpecDatabase::new();
        registry.register(&mut base_level, &self.cancel)?;
        if registry.is_empty() {
            return Err(BuildError::MissingContent(format!(
                "Content spec \"{}\" does not reference any topics",
                spec.title
            )));
        }

        let locale = if spec.locale.trim().is_empty() {
            options.default_locale.clone()
        } else {
            spec.locale.clone()
        };
        let (topics, use_fixed_urls) = self.fetch_topics(&registry, options, &locale)?;
        info!(
            "Fetched {} topics for {} topic references",
            topics.len(),
            registry.steps().len()
        );

        let mut build = BookBuild {
            spec,
            options,
            base_level,
            registry,
            errors: ErrorDatabase::new(locale.as_str()),
            topics,
            use_fixed_urls,
            locale,
            escaped_title: escape_title(&spec.title),
            requester,
        };

        let mut ids = UniqueIdEnforcer::new();
        self.process_topics(&mut build, &mut ids)?;
        self.process_spec_topics(&mut build, &mut ids)?;
        let images = self.collect_images(&mut build)?;

        let manifest = assembly::Assembler::new(self.store, &*self.templates, &build)
            .assemble(&images, &self.cancel)?;
        self.cancel.check()?;

        let stats = BuildStats {
            topics: build.topics.len(),
            spec_topics: build.registry.steps().len(),
            errors: build.errors.count(ErrorSeverity::Error),
            warnings: build.errors.count(ErrorSeverity::Warning),
            images: images.len(),
            used_fixed_urls: build.use_fixed_urls,
            build_time: start_time.elapsed(),
        };
        info!(
            "Build completed in {:?} with {} errors and {} warnings",
            stats.build_time, stats.errors, stats.warnings
        );
        Ok(BuildOutput { manifest, stats })
    }

    /// Fetches one topic per distinct id, in first-seen order.
    fn fetch_topics(
        &self,
        registry: &SpecDatabase,
        options: &BuildingOptions,
        locale: &str,
    ) -> Result<(Vec<BuildTopic>, bool)> {
        let ids = registry.topic_ids();

        if locale != options.default_locale {
            info!("Building translated book for locale {}", locale);
            let translated = TranslationCompleter::new(self.store, &self.cancel).fetch(&ids, locale)?;
            return Ok((translated.into_iter().map(BuildTopic::Translated).collect(), true));
        }

        let fetched = self.store.topics(&ids)?;
        let mut topics = Vec::with_capacity(ids.len());
        for id in &ids {
            match fetched.iter().find(|t| t.id == *id) {
                Some(topic) => topics.push(topic.clone()),
                None => {
                    return Err(BuildError::Store(StoreError::NotFound {
                        kind: "topic",
                        id: *id,
                    }))
                }
            }
        }

        let used_fixed_urls = FixedUrlAssigner::new(self.store, &self.cancel)
            .with_limits(options.fixed_url_retries, options.fixed_url_name_attempts)
            .assign(&mut topics)?;
        if !used_fixed_urls {
            warn!("Stable addresses could not be assigned, falling back to topic id links");
        }
        Ok((topics.into_iter().map(BuildTopic::Plain).collect(), used_fixed_urls))
    }

    /// Parses every topic once, records its ids and hands the result to each
    /// of its occurrences.
    fn process_topics(&self, build: &mut BookBuild<'_>, ids: &mut UniqueIdEnforcer) -> Result<()> {
        let total = build.topics.len();
        for (index, topic) in build.topics.iter().enumerate() {
            self.cancel.check()?;
            debug!("Processing topic {} ({}/{})", topic.topic_id(), index + 1, total);

            let (document, status) = if topic.xml().trim().is_empty() {
                build.errors.add_warning(topic, "This topic has no XML data");
                let content = self
                    .templates
                    .render(EMPTY_TOPIC_TEMPLATE, &build.fallback_context(topic))?;
                (None, TopicStatus::Fallback { content })
            } else {
                match XmlDocument::parse(topic.xml()) {
                    Ok(mut doc) => {
                        let link_id = topic.link_id(build.use_fixed_urls);
                        doc.root.set_attribute("id", &escape(link_id.as_str()));
                        ids.record(topic.topic_id(), &doc);
                        (Some(doc), TopicStatus::Pending)
                    }
                    Err(e) => {
                        build.errors.add_error(
                            topic,
                            &format!(
                                "This topic doesn't have well-formed xml. The error is <emphasis>{}</emphasis>",
                                escape(e.to_string().as_str())
                            ),
                        );
                        let content = self
                            .templates
                            .render(FAILED_VALIDATION_TEMPLATE, &build.fallback_context(topic))?;
                        (None, TopicStatus::Fallback { content })
                    }
                }
            };

            for step in build.registry.steps_for(topic.topic_id()) {
                let Some(entry) = build.registry.entry_mut(step) else {
                    continue;
                };
                entry.topic = Some(topic.clone());
                entry.document = document.clone();
                entry.status = status.clone();
                let context = TemplateContext::new()
                    .with("title", topic.title())
                    .with("topic_id", &topic.topic_id())
                    .with("topic_revision", &topic.topic_revision())
                    .with("section_id", &entry.unique_link_id(build.use_fixed_urls));
                entry.context = Some(context);
            }
        }
        info!("Processed {} topics", total);
        Ok(())
    }

    /// Injection, validation and id uniqueness for every topic reference.
    fn process_spec_topics(&self, build: &mut BookBuild<'_>, ids: &mut UniqueIdEnforcer) -> Result<()> {
        let injection = InjectionOptions::resolve(
            build.options,
            build.spec.injection,
            &build.spec.injection_types,
        );
        let dtd = String::from_utf8_lossy(&self.store.blob_constant(DOCBOOK_DTD_BLOB_ID)?).into_owned();

        for entry in build.registry.entries() {
            ids.reserve(entry.unique_link_id(build.use_fixed_urls));
        }
        for level in build.registry.levels() {
            ids.reserve(level.unique_link_id(build.use_fixed_urls));
        }

        let steps = build.registry.steps();
        let total = steps.len();
        let mut last_percent = 0;
        for (index, step) in steps.into_iter().enumerate() {
            self.cancel.check()?;
            let percent = (index + 1) * 100 / total.max(1);
            if percent / 10 > last_percent / 10 {
                info!("\tProcessing topic references {}% done", percent);
            }
            last_percent = percent;

            let Some(entry) = build.registry.entry_mut(step) else {
                continue;
            };
            let Some(topic) = entry.topic.clone() else {
                continue;
            };
            let duplicate_id = entry.duplicate_id;
            let section_id = entry.unique_link_id(build.use_fixed_urls);
            let mut context = entry.context.take().unwrap_or_default();
            let document = entry.document.take();

            if topic.is_translated() {
                self.untranslated_related_warnings(build, &topic);
            }
            if topic.is_dummy() {
                build.errors.add_warning(&topic, "This topic is an untranslated topic.");
            } else if topic.is_incomplete() {
                build
                    .errors
                    .add_warning(&topic, "This topic is a translated topic that hasn't been fully translated.");
            }

            let Some(mut doc) = document else {
                build.registry.set_context(step, context);
                continue;
            };
            doc.root.set_attribute("id", &escape(section_id.as_str()));

            let mut report = InjectionReport::default();
            if injection.is_injection_allowed_for(&topic) {
                let links = BookLinks::new(&build.registry, build.use_fixed_urls, step);
                report = InjectionResolver::new(&links, build.options.ignore_missing_injections)
                    .process(&topic, &mut doc);
            }
            match build.spec.output_style {
                OutputStyle::Skynet => {
                    if injection.is_injection_allowed() {
                        let links = BookLinks::new(&build.registry, build.use_fixed_urls, step);
                        let generic = generic_related_topics(
                            &topic,
                            &links,
                            &report.claimed,
                            build.options.ignore_missing_injections,
                        );
                        if let Some(message) = generic.error_message() {
                            report.errors.push(message);
                        }
                        context.insert("related_topics", &generic.lists);
                    }
                }
                OutputStyle::ContentSpecProcessor => {
                    if injection.is_injection_allowed() {
                        SpecRelationships::collect(&build.registry, step, build.use_fixed_urls)
                            .apply_to(&mut context);
                    }
                }
            }

            for warning in &report.warnings {
                build.errors.add_warning(&topic, warning);
            }
            for message in &report.errors {
                build.errors.add_error(&topic, message);
            }

            let (document, status) = if report.is_valid() {
                self.validate_topic(build, &topic, doc, &mut context, &dtd)?
            } else {
                build.errors.add_error(
                    &topic,
                    &format!(
                        "Topic has invalid Injection Points. The processed XML is <programlisting>{}</programlisting>",
                        wrap_in_cdata(&doc.root.to_xml())
                    ),
                );
                let content = self
                    .templates
                    .render(FAILED_INJECTION_TEMPLATE, &build.fallback_context(&topic))?;
                (None, TopicStatus::Fallback { content })
            };

            let document = match document {
                Some(mut doc) => {
                    let renamed = ids.enforce(topic.topic_id(), duplicate_id, step, &mut doc, &self.cancel)?;
                    if !renamed.is_empty() {
                        debug!("Topic reference {}: renamed {} ids", step, renamed.len());
                    }
                    Some(doc)
                }
                None => None,
            };

            if let Some(entry) = build.registry.entry_mut(step) {
                entry.document = document;
                entry.status = status;
                entry.context = Some(context);
            }
        }
        info!("Processed {} topic references", total);
        Ok(())
    }

    /// Warns about related topics that only exist as placeholders in this
    /// locale. Related topics outside the book are only reported when missing
    /// injections are not being ignored.
    fn untranslated_related_warnings(&self, build: &mut BookBuild<'_>, topic: &BuildTopic) {
        for related in topic.outgoing() {
            if !related.is_dummy() {
                continue;
            }
            let in_book = build.registry.contains_topic(related.topic_id());
            if !in_book && build.options.ignore_missing_injections {
                continue;
            }
            build.errors.add_warning(
                topic,
                &format!(
                    "Topic ID {}, Revision {}, Title \"{}\" is an untranslated topic.",
                    related.topic_id(),
                    related.topic_revision(),
                    escape(related.title())
                ),
            );
        }
    }

    /// Renders the processed topic and checks it against the DTD.
    fn validate_topic(
        &self,
        build: &mut BookBuild<'_>,
        topic: &BuildTopic,
        mut doc: XmlDocument,
        context: &mut TemplateContext,
        dtd: &str,
    ) -> Result<(Option<XmlDocument>, TopicStatus)> {
        if build.options.insert_bugzilla_links {
            context.insert("bug_link", &bug_link(build, topic));
        }
        // the template supplies the title
        doc.root.remove_first_child("title");
        context.insert("content", &doc.root.inner_xml());
        context.insert("include_preamble", &false);
        let rendered = self.templates.render(TOPIC_TEMPLATE, context)?;

        let failure = match XmlDocument::parse(&rendered) {
            Ok(rendered_doc) => {
                let result = self.validator.validate(&rendered_doc, dtd);
                if result.passed {
                    return Ok((Some(rendered_doc), TopicStatus::Valid));
                }
                result.error_message.unwrap_or_default()
            }
            Err(e) => e.to_string(),
        };

        build_error_with_xml(build, topic, &failure, &rendered);
        let content = self
            .templates
            .render(FAILED_VALIDATION_TEMPLATE, &build.fallback_context(topic))?;
        Ok((None, TopicStatus::Fallback { content }))
    }

    /// Moves every `imagedata` reference of the topics in the book under
    /// `images/` and loads the referenced files. References the store cannot
    /// satisfy are reported against their topic and replaced by the
    /// placeholder image.
    fn collect_images(&self, build: &mut BookBuild<'_>) -> Result<BTreeMap<String, Vec<u8>>> {
        let outlined = assembly::outlined_steps(&build.base_level);
        let mut references: Vec<(BuildTopic, String, String)> = Vec::new();
        for step in build.registry.steps() {
            if !outlined.contains(&step) {
                continue;
            }
            let Some(entry) = build.registry.entry_mut(step) else {
                continue;
            };
            let (Some(topic), Some(doc)) = (entry.topic.as_ref(), entry.document.as_mut()) else {
                continue;
            };
            doc.root.visit_elements_mut(&mut |e: &mut Element| {
                if e.name != "imagedata" {
                    return;
                }
                let Some(fileref) = e.attribute("fileref").map(str::to_string) else {
                    return;
                };
                let name = fileref.trim_start_matches("images/");
                let name = if is_safe_image_name(name) {
                    name.to_string()
                } else {
                    PLACEHOLDER_IMAGE_NAME.to_string()
                };
                e.set_attribute("fileref", &format!("images/{}", name));
                references.push((topic.clone(), fileref, name));
            });
        }
        debug!("Found {} image references", references.len());

        let mut images = BTreeMap::new();
        if references.is_empty() {
            return Ok(images);
        }
        let placeholder = self.store.blob_constant(FAILPENGUIN_PNG_BLOB_ID)?;
        for (topic, fileref, name) in references {
            self.cancel.check()?;
            let image = match image_id(&name) {
                Some(id) => match self.store.image(id)? {
                    Some(bytes) => Some(bytes),
                    None => {
                        build.errors.add_error(
                            &topic,
                            &format!("ImageFile ID {} from image location {} was not found!", id, escape(fileref.as_str())),
                        );
                        None
                    }
                },
                None => {
                    build.errors.add_error(
                        &topic,
                        &format!(
                            "{} is not a valid image. Must be in the format [ImageFileID].extension e.g. 123.png, or images/321.jpg",
                            escape(fileref.as_str())
                        ),
                    );
                    None
                }
            };
            images
                .entry(name)
                .or_insert_with(|| image.unwrap_or_else(|| placeholder.clone()));
        }
        Ok(images)
    }
}

fn build_error_with_xml(build: &mut BookBuild<'_>, topic: &BuildTopic, failure: &str, xml: &str) {
    build.errors.add_error(
        topic,
        &format!(
            "Topic has invalid Docbook XML. The error is <emphasis>{}</emphasis>. The processed XML is <programlisting>{}</programlisting>",
            escape(failure),
            wrap_in_cdata(xml)
        ),
    );
}

/// Image id of an image file name: the part between the last `/` and the
/// last `.`.
pub fn image_id(file_name: &str) -> Option<i64> {
    let start = file_name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let end = file_name.rfind('.').filter(|end| *end >= start).unwrap_or(file_name.len());
    file_name[start..end].parse().ok()
}

/// Bug report URL for a topic. Carries no build date, so repeated builds
/// render identical topics.
fn bug_link(build: &BookBuild<'_>, topic: &BuildTopic) -> String {
    let spec = build.spec;
    let product = topic
        .tag_property(BUG_PRODUCT_PROPERTY_TAG_ID)
        .or(spec.product.as_deref())
        .unwrap_or_default();
    let component = topic
        .tag_property(BUG_COMPONENT_PROPERTY_TAG_ID)
        .unwrap_or("documentation");
    let version = topic
        .tag_property(BUG_VERSION_PROPERTY_TAG_ID)
        .or(spec.version.as_deref())
        .unwrap_or_default();
    let build_name = build
        .options
        .build_name
        .clone()
        .unwrap_or_else(|| build.escaped_title.clone());
    let environment = format!(
        "Build Name: {}\nBuild Locale: {}\nTopic ID: {}-{}",
        build_name,
        build.locale,
        topic.topic_id(),
        topic.topic_revision()
    );

    let mut params = vec![
        ("product", product.to_string()),
        ("component", component.to_string()),
        ("version", version.to_string()),
        ("cf_environment", environment),
    ];
    if let Some(keywords) = topic.tag_property(BUG_KEYWORDS_PROPERTY_TAG_ID) {
        params.push(("keywords", keywords.to_string()));
    }
    if let Some(assignee) = topic.tag_property(BUG_ASSIGNED_TO_PROPERTY_TAG_ID) {
        params.push(("assigned_to", assignee.to_string()));
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, utf8_percent_encode(value, NON_ALPHANUMERIC)))
        .collect::<Vec<_>>()
        .join("&");
    let base = build.options.bugzilla_url.trim_end_matches('/');
    format!("{}/enter_bug.cgi?{}", base, query)
}

/// File name invalid image references are pointed at.
const PLACEHOLDER_IMAGE_NAME: &str = "failpenguin.png";

/// Whether `name` stays inside the images folder.
fn is_safe_image_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.contains('\\')
        && name.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
