//! End-to-end builds against the in-memory topic store.

mod common;

use std::collections::HashSet;

use regex::Regex;

use common::{file, init_logging, options, store, store_with_dtd, topic, PENGUIN};
use docbook_forge::store::{AuthorInformation, TopicPropertyUpdate};
use docbook_forge::topic::{REFERENCE_TAG_ID, TASK_TAG_ID, WRITER_CATEGORY_ID};
use docbook_forge::{
    BookBuilder, BuildError, CancellationToken, ContentSpec, InMemoryTopicStore, Level, LevelType,
    Node, OutputStyle, RelationshipKind, SpecTopic, StoreError, Tag, Topic, TopicStore,
    TranslatedTopic,
};

fn chapter(title: &str, topics: &[(i64, &str)]) -> Level {
    topics
        .iter()
        .fold(Level::new(LevelType::Chapter, title), |level, (id, title)| {
            level.with_topic(SpecTopic::new(*id, *title))
        })
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("{:?} not found in {}", needle, haystack))
}

#[test]
fn test_builds_publican_archive_layout() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Download", "<para>Get it.</para>"))
        .with_topic(topic(2, "Unpack", "<para>Unpack it.</para>"));
    let spec = ContentSpec::new("Setup Guide", "en-US")
        .with_level(chapter("Installation", &[(1, "Download"), (2, "Unpack")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    for path in [
        "Setup_Guide/publican.cfg",
        "Setup_Guide/en-US/Setup_Guide.xml",
        "Setup_Guide/en-US/Setup_Guide.ent",
        "Setup_Guide/en-US/Book_Info.xml",
        "Setup_Guide/en-US/Author_Group.xml",
        "Setup_Guide/en-US/Preface.xml",
        "Setup_Guide/en-US/Revision_History.xml",
        "Setup_Guide/en-US/Errors.xml",
        "Setup_Guide/en-US/Build_Content_Specification.xml",
        "Setup_Guide/en-US/chap-Installation.xml",
        "Setup_Guide/en-US/topics/Download.xml",
        "Setup_Guide/en-US/topics/Unpack.xml",
        "Setup_Guide/en-US/images/icon.svg",
    ] {
        assert!(output.manifest.contains(path), "missing {}", path);
    }
    assert!(!output.manifest.contains("Setup_Guide/en-US/files/treeview.css"));

    assert_eq!(
        file(&output, "Setup_Guide/publican.cfg"),
        "xml_lang: en-US\ntype: Book\nbrand: common\n"
    );

    let book = file(&output, "Setup_Guide/en-US/Setup_Guide.xml");
    let errors = position(book, "href=\"Errors.xml\"");
    let chapter = position(book, "href=\"chap-Installation.xml\"");
    let appendix = position(book, "href=\"Build_Content_Specification.xml\"");
    assert!(errors < chapter && chapter < appendix);
    assert!(book.contains("<!DOCTYPE book PUBLIC"));

    let chapter = file(&output, "Setup_Guide/en-US/chap-Installation.xml");
    assert!(chapter.contains("<chapter id=\"chap-Installation\">"));
    assert!(position(chapter, "topics/Download.xml") < position(chapter, "topics/Unpack.xml"));

    let download = file(&output, "Setup_Guide/en-US/topics/Download.xml");
    assert!(download.starts_with("<?xml"));
    assert!(download.contains("<section id=\"Download\">"));
    assert!(download.contains("<para>Get it.</para>"));
    assert!(download.contains("enter_bug.cgi?product="));

    let errors = file(&output, "Setup_Guide/en-US/Errors.xml");
    assert!(errors.contains("<chapter id=\"Compiler_Output\">"));
    assert!(errors.contains("No Errors Found"));

    let history = file(&output, "Setup_Guide/en-US/Revision_History.xml");
    assert!(history.contains("<date>Fri Mar 01 2024</date>"));
    assert!(history.contains("<revnumber>1-0</revnumber>"));
    assert!(history.contains("<firstname>Unknown</firstname>"));

    let entities = file(&output, "Setup_Guide/en-US/Setup_Guide.ent");
    assert!(entities.contains("<!ENTITY YEAR \"2024\">"));
    assert!(entities.contains("<!ENTITY HOLDER \"Red Hat, Inc.\">"));

    assert_eq!(output.stats.topics, 2);
    assert_eq!(output.stats.spec_topics, 2);
    assert_eq!(output.stats.errors, 0);
    assert!(output.stats.used_fixed_urls);
}

#[test]
fn test_duplicate_topics_get_suffixed_links_and_unique_ids() {
    init_logging();
    let store = store()
        .with_topic(topic(
            1,
            "Download",
            "<para id=\"intro\">a</para><para>see <xref linkend=\"intro\"/></para>",
        ))
        .with_topic(topic(2, "Configure", "<para id=\"intro\">b</para>"));
    let spec = ContentSpec::new("Book", "en-US")
        .with_level(chapter("Basics", &[(1, "Download"), (2, "Configure")]))
        .with_level(chapter("Advanced", &[(1, "Download")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let first = file(&output, "Book/en-US/topics/Download.xml");
    let second = file(&output, "Book/en-US/topics/Download-1.xml");
    let other = file(&output, "Book/en-US/topics/Configure.xml");

    assert!(first.contains("<section id=\"Download\">"));
    assert!(first.contains("<para id=\"intro-3\">"));
    assert!(first.contains("linkend=\"intro-3\""));
    assert!(other.contains("<para id=\"intro-4\">"));
    assert!(second.contains("<section id=\"Download-1\">"));
    assert!(second.contains("<para id=\"intro-1\">"));
    assert!(second.contains("linkend=\"intro-1\""));

    let advanced = file(&output, "Book/en-US/chap-Advanced.xml");
    assert!(advanced.contains("topics/Download-1.xml"));

    let id_attribute = Regex::new(r#"\sid="([^"]+)""#).unwrap();
    let mut seen = HashSet::new();
    for (path, contents) in output.manifest.iter() {
        if !path.contains("/topics/") {
            continue;
        }
        let contents = std::str::from_utf8(contents).unwrap();
        for caps in id_attribute.captures_iter(contents) {
            assert!(seen.insert(caps[1].to_string()), "duplicate id {}", &caps[1]);
        }
    }
    assert_eq!(output.stats.spec_topics, 3);
    assert_eq!(output.stats.topics, 2);
}

#[test]
fn test_injection_lists_link_related_topics() {
    init_logging();
    let mut overview = topic(
        1,
        "Overview",
        "<para>See:</para><!-- InjectListAlphaSort: 3, 2 --><!-- InjectSequence: 2 -->",
    );
    let mut zeta = topic(2, "Zeta Task", "<para>z</para>");
    let mut alpha = topic(3, "Alpha Task", "<para>a</para>");
    overview.relate_to(&mut zeta);
    overview.relate_to(&mut alpha);
    let store = store().with_topic(overview).with_topic(zeta).with_topic(alpha);
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter(
        "Guide",
        &[(1, "Overview"), (2, "Zeta Task"), (3, "Alpha Task")],
    ));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let overview = file(&output, "Book/en-US/topics/Overview.xml");
    assert!(!overview.contains("InjectList"));
    assert!(!overview.contains("InjectSequence"));
    let list = position(overview, "<itemizedlist>");
    let sequence = position(overview, "<orderedlist>");
    assert!(list < position(overview, "linkend=\"Alpha_Task\""));
    assert!(position(overview, "linkend=\"Alpha_Task\"") < position(overview, "linkend=\"Zeta_Task\""));
    assert!(sequence > position(overview, "linkend=\"Zeta_Task\""));
    assert!(overview[sequence..].contains("linkend=\"Zeta_Task\""));
    assert_eq!(output.stats.errors, 0);
}

fn optional_injection_build(ignore_missing: bool) -> docbook_forge::BuildOutput {
    let mut overview = topic(1, "Overview", "<para>Intro</para><!-- InjectList: OPT: 9 -->");
    let mut elsewhere = topic(9, "Elsewhere", "<para>x</para>");
    overview.relate_to(&mut elsewhere);
    let store = store().with_topic(overview);
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Overview")]));
    let mut options = options();
    options.ignore_missing_injections = ignore_missing;
    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();
    output
}

#[test]
fn test_optional_injection_is_tolerated() {
    init_logging();
    let output = optional_injection_build(true);
    let overview = file(&output, "Book/en-US/topics/Overview.xml");
    assert!(overview.contains("<para>Intro</para>"));
    assert!(!overview.contains("InjectList"));
    assert!(!overview.contains("<itemizedlist"));
    assert_eq!(output.stats.errors, 0);
    assert_eq!(output.stats.warnings, 0);
}

#[test]
fn test_unresolved_injection_falls_back_and_reports() {
    init_logging();
    let output = optional_injection_build(false);
    let overview = file(&output, "Book/en-US/topics/Overview.xml");
    assert!(overview.contains("could not be built because its injection points"));
    assert!(overview.contains("linkend=\"TopicErrorID1\""));

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("<section id=\"TopicErrorID1\">"));
    assert!(errors.contains("Topic ID 1, Revision 1"));
    assert!(errors.contains("ERROR: Topic has referenced Topic(s) 9"));
    assert!(errors.contains("ERROR: Topic has invalid Injection Points."));
    assert_eq!(output.stats.errors, 2);
}

#[test]
fn test_malformed_topic_xml_uses_placeholder() {
    init_logging();
    let store = store()
        .with_topic(Topic::new(5, "Broken", "<section><title>Broken</para></section>"))
        .with_topic(topic(6, "Fine", "<para>ok</para>"));
    let spec = ContentSpec::new("Book", "en-US")
        .with_level(chapter("Mixed", &[(5, "Broken"), (6, "Fine")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let broken = file(&output, "Book/en-US/topics/Broken.xml");
    assert!(broken.contains("<section id=\"Broken\">"));
    assert!(broken.contains("failed validation and has been replaced"));
    assert!(file(&output, "Book/en-US/topics/Fine.xml").contains("<para>ok</para>"));

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("ERROR: This topic doesn't have well-formed xml."));
    assert_eq!(output.stats.errors, 1);
}

#[test]
fn test_empty_topic_gets_warning_placeholder() {
    init_logging();
    let store = store().with_topic(Topic::new(7, "Blank", ""));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(7, "Blank")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    assert!(file(&output, "Book/en-US/topics/Blank.xml").contains("This topic has no XML content."));
    assert!(file(&output, "Book/en-US/Errors.xml").contains("WARNING: This topic has no XML data"));
    assert_eq!(output.stats.warnings, 1);
}

#[test]
fn test_dtd_validation_failure_uses_placeholder() {
    init_logging();
    let dtd = r#"
<!ELEMENT section ANY>
<!ELEMENT title (#PCDATA)>
<!ELEMENT para ANY>
<!ELEMENT simplesect ANY>
<!ELEMENT ulink (#PCDATA)>
"#;
    let store = store_with_dtd(dtd)
        .with_topic(topic(1, "Shiny", "<para>ok</para><blink/>"))
        .with_topic(topic(2, "Plain", "<para>fine</para>"));
    let spec = ContentSpec::new("Book", "en-US")
        .with_level(chapter("Guide", &[(1, "Shiny"), (2, "Plain")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let shiny = file(&output, "Book/en-US/topics/Shiny.xml");
    assert!(shiny.contains("failed validation and has been replaced"));
    assert!(!shiny.contains("<blink/>"));
    assert!(file(&output, "Book/en-US/topics/Plain.xml").contains("<para>fine</para>"));

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("Topic has invalid Docbook XML."));
    assert!(errors.contains("Element type &quot;blink&quot; must be declared."));
    assert!(errors.contains("<programlisting><![CDATA["));
    assert_eq!(output.stats.errors, 1);
}

#[test]
fn test_repeated_builds_are_identical() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Download", "<para id=\"intro\">a</para>"))
        .with_topic(topic(2, "Download", "<para>same title</para>"));
    let spec = ContentSpec::new("Book", "en-US")
        .with_level(chapter("Basics", &[(1, "Download"), (2, "Download")]))
        .with_level(chapter("Basics", &[(1, "Download")]));
    let builder = BookBuilder::new(&store).unwrap();

    let first = builder.build(&spec, &options(), None).unwrap();
    let second = builder.build(&spec, &options(), None).unwrap();

    assert_eq!(first.manifest, second.manifest);
    assert_eq!(store.update_calls(), 1);
    assert!(first.manifest.contains("Book/en-US/topics/Download.xml"));
    assert!(first.manifest.contains("Book/en-US/topics/Download1.xml"));
    assert!(first.manifest.contains("Book/en-US/topics/Download-1.xml"));
    assert!(first.manifest.contains("Book/en-US/chap-Basics.xml"));
    assert!(first.manifest.contains("Book/en-US/chap-Basics-1.xml"));
}

#[test]
fn test_cancelled_build_returns_no_manifest() {
    init_logging();
    let store = store().with_topic(topic(1, "Download", "<para>x</para>"));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Download")]));
    let builder = BookBuilder::new(&store).unwrap();
    builder.cancellation_token().cancel();

    let result = builder.build(&spec, &options(), None);
    assert!(matches!(result, Err(BuildError::Cancelled)));
}

#[test]
fn test_spec_without_topics_is_rejected() {
    init_logging();
    let store = store();
    let spec = ContentSpec::new("Book", "en-US").with_level(Level::new(LevelType::Chapter, "Empty"));

    let result = BookBuilder::new(&store).unwrap().build(&spec, &options(), None);
    assert!(matches!(result, Err(BuildError::MissingContent(_))));
}

#[test]
fn test_unknown_topic_aborts_build() {
    init_logging();
    let store = store();
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(99, "Ghost")]));

    let result = BookBuilder::new(&store).unwrap().build(&spec, &options(), None);
    assert!(matches!(
        result,
        Err(BuildError::Store(StoreError::NotFound { id: 99, .. }))
    ));
}

#[test]
fn test_translated_build_fills_missing_translations() {
    init_logging();
    let mut german = Topic::new(
        101,
        "Alpha (de)",
        "<section><title>Alpha (de)</title><para>Hallo</para></section>",
    );
    german.locale = "de-DE".to_string();
    let store = store()
        .with_topic(topic(1, "Alpha", "<para>Hello</para>"))
        .with_topic(topic(2, "Beta", "<para>World</para>"))
        .with_translation(TranslatedTopic {
            topic: german,
            topic_id: 1,
            topic_revision: 1,
            translation_percentage: 80,
            dummy: false,
        });
    let spec = ContentSpec::new("Book", "de-DE")
        .with_level(chapter("Guide", &[(1, "Alpha"), (2, "Beta")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let alpha = file(&output, "Book/de-DE/topics/TopicID1.xml");
    assert!(alpha.contains("<para>Hallo</para>"));
    let beta = file(&output, "Book/de-DE/topics/TopicID2.xml");
    assert!(beta.contains("<title>[en-US] Beta</title>"));
    assert!(beta.contains("<para>World</para>"));
    assert!(output.manifest.contains("Book/de-DE/chap-Guide.xml"));
    assert!(file(&output, "Book/publican.cfg").starts_with("xml_lang: de-DE\n"));

    let errors = file(&output, "Book/de-DE/Errors.xml");
    assert!(errors.contains("This topic is an untranslated topic."));
    assert!(errors.contains("hasn't been fully translated."));
    assert_eq!(output.stats.warnings, 2);
}

#[test]
fn test_failed_addressing_falls_back_to_topic_ids() {
    init_logging();
    let store = store().with_topic(topic(1, "Alpha", "<para>a</para>"));
    store.fail_next_updates(10);
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Alpha")]));
    let mut options = options();
    options.fixed_url_retries = 2;

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    assert!(!output.stats.used_fixed_urls);
    assert_eq!(store.update_calls(), 2);
    let topic = file(&output, "Book/en-US/topics/TopicID1.xml");
    assert!(topic.contains("<section id=\"TopicID1\">"));
    assert!(file(&output, "Book/en-US/Book.xml").contains("href=\"ChapterID2.xml\""));
    assert!(file(&output, "Book/en-US/ChapterID2.xml").contains("<chapter id=\"ChapterID2\">"));
}

#[test]
fn test_suppressed_pages_are_left_out() {
    init_logging();
    let store = store()
        .with_topic(Topic::new(5, "Broken", "<section>"))
        .with_topic(topic(6, "Fine", "<para>ok</para>"));
    let spec = ContentSpec::new("Book", "en-US")
        .with_level(chapter("Guide", &[(5, "Broken"), (6, "Fine")]));
    let mut options = options();
    options.suppress_errors_page = true;
    options.suppress_content_spec_page = true;

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    assert!(!output.manifest.contains("Book/en-US/Errors.xml"));
    assert!(!output.manifest.contains("Book/en-US/Build_Content_Specification.xml"));
    let book = file(&output, "Book/en-US/Book.xml");
    assert!(!book.contains("Errors.xml"));
    assert!(!book.contains("Build_Content_Specification.xml"));
    assert!(!file(&output, "Book/en-US/topics/Broken.xml").contains("<xref"));
    assert_eq!(output.stats.errors, 1);
}

#[test]
fn test_process_relationships_render_step_links() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Download", "<para>d</para>"))
        .with_topic(topic(2, "Unpack", "<para>u</para>"));
    let spec = ContentSpec::new("Book", "en-US").with_level(
        Level::new(LevelType::Chapter, "Install Process")
            .with_topic(SpecTopic::new(1, "Download").with_relationship(RelationshipKind::Next, "T2"))
            .with_topic(
                SpecTopic::new(2, "Unpack")
                    .with_relationship(RelationshipKind::Previous, "T1")
                    .with_relationship(RelationshipKind::Prerequisite, "T1"),
            ),
    );

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let download = file(&output, "Book/en-US/topics/Download.xml");
    assert!(download.contains("role=\"process-next\""));
    assert!(download.contains("linkend=\"chap-Install_Process\""));
    assert!(download.contains("linkend=\"Unpack\""));

    let unpack = file(&output, "Book/en-US/topics/Unpack.xml");
    assert!(unpack.contains("role=\"process-previous\""));
    assert!(unpack.contains("role=\"prereqs-list\""));
    assert!(unpack.contains("linkend=\"Download\""));
}

#[test]
fn test_images_are_relocated_and_missing_ones_replaced() {
    init_logging();
    let store = store()
        .with_image(42, vec![1, 2, 3])
        .with_topic(topic(
            1,
            "Pictures",
            "<mediaobject><imageobject><imagedata fileref=\"images/42.png\"/></imageobject></mediaobject>\
             <mediaobject><imageobject><imagedata fileref=\"7.svg\"/></imageobject></mediaobject>",
        ));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Pictures")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    assert_eq!(output.manifest.get("Book/en-US/images/42.png"), Some(&[1u8, 2, 3][..]));
    assert_eq!(output.manifest.get("Book/en-US/images/7.svg"), Some(PENGUIN));
    let pictures = file(&output, "Book/en-US/topics/Pictures.xml");
    assert!(pictures.contains("fileref=\"images/42.png\""));
    assert!(pictures.contains("fileref=\"images/7.svg\""));
    assert_eq!(output.stats.images, 2);

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("ImageFile ID 7 from image location 7.svg was not found!"));
    assert_eq!(output.stats.errors, 1);
}

#[test]
fn test_invalid_image_references_are_reported_and_contained() {
    init_logging();
    let store = store().with_topic(topic(
        1,
        "Pictures",
        "<mediaobject><imageobject><imagedata fileref=\"images/../../publican.cfg\"/></imageobject></mediaobject>\
         <mediaobject><imageobject><imagedata fileref=\"images/logo.png\"/></imageobject></mediaobject>",
    ));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Pictures")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    assert!(output.manifest.paths().all(|path| !path.contains("..")));
    assert_eq!(output.manifest.get("Book/en-US/images/failpenguin.png"), Some(PENGUIN));
    assert_eq!(output.manifest.get("Book/en-US/images/logo.png"), Some(PENGUIN));
    let pictures = file(&output, "Book/en-US/topics/Pictures.xml");
    assert!(pictures.contains("fileref=\"images/failpenguin.png\""));

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("images/../../publican.cfg is not a valid image."));
    assert!(errors.contains("images/logo.png is not a valid image."));
    assert_eq!(output.stats.errors, 2);
}

fn skynet_store(with_missing: bool) -> InMemoryTopicStore {
    let mut overview = topic(1, "Overview", "<para>o</para>");
    let mut deploy = topic(2, "Deploy", "<para>d</para>").with_tag(Tag::new(TASK_TAG_ID, "Task"));
    let mut settings =
        topic(3, "Settings", "<para>s</para>").with_tag(Tag::new(REFERENCE_TAG_ID, "Reference"));
    overview.relate_to(&mut deploy);
    overview.relate_to(&mut settings);
    if with_missing {
        let mut hidden = topic(4, "Hidden", "<para>h</para>").with_tag(Tag::new(TASK_TAG_ID, "Task"));
        overview.relate_to(&mut hidden);
    }
    store().with_topic(overview).with_topic(deploy).with_topic(settings)
}

fn skynet_spec() -> ContentSpec {
    let mut spec = ContentSpec::new("Book", "en-US").with_level(chapter(
        "Guide",
        &[(1, "Overview"), (2, "Deploy"), (3, "Settings")],
    ));
    spec.output_style = OutputStyle::Skynet;
    spec
}

#[test]
fn test_skynet_style_lists_related_topics_by_type() {
    init_logging();
    let store = skynet_store(false);
    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&skynet_spec(), &options(), None)
        .unwrap();

    let overview = file(&output, "Book/en-US/topics/Overview.xml");
    let reference = position(overview, "role=\"related-reference\"");
    let task = position(overview, "role=\"related-task\"");
    assert!(reference < task);
    assert!(overview[reference..task].contains("linkend=\"Settings\""));
    assert!(overview[task..].contains("linkend=\"Deploy\""));
    assert!(output.manifest.contains("Book/en-US/files/treeview.css"));
    assert!(output.manifest.contains("Book/en-US/images/jboss.svg"));
    assert_eq!(output.stats.errors, 0);
}

#[test]
fn test_skynet_style_reports_related_topics_outside_the_book() {
    init_logging();
    let store = skynet_store(true);
    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&skynet_spec(), &options(), None)
        .unwrap();

    let errors = file(&output, "Book/en-US/Errors.xml");
    assert!(errors.contains("Topic has related Topic(s) 4 that were not included"));
    assert!(file(&output, "Book/en-US/topics/Overview.xml").contains("could not be built"));
}

#[test]
fn test_authors_and_requester_come_from_writer_tags() {
    init_logging();
    let writer = Tag::new(30, "jdoe").in_category(WRITER_CATEGORY_ID);
    let store = store()
        .with_author(
            writer.clone(),
            AuthorInformation {
                author_id: 30,
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: Some("jane@example.com".to_string()),
                organization: Some("Docs".to_string()),
                org_division: None,
            },
        )
        .with_topic(topic(1, "Alpha", "<para>a</para>").with_tag(writer));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Alpha")]));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), Some("jdoe"))
        .unwrap();

    let authors = file(&output, "Book/en-US/Author_Group.xml");
    assert!(authors.contains("<firstname>Jane</firstname>"));
    assert!(authors.contains("<orgname>Docs</orgname>"));
    assert!(!authors.contains("Unknown"));

    let history = file(&output, "Book/en-US/Revision_History.xml");
    assert!(history.contains("<surname>Doe</surname>"));
    assert!(history.contains("<email>jane@example.com</email>"));
}

#[test]
fn test_publican_cfg_and_metadata_overrides() {
    init_logging();
    let store = store().with_topic(topic(1, "Alpha", "<para>a</para>"));
    let mut spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Alpha")]));
    spec.brand = Some("RedHat".to_string());
    spec.publican_cfg = Some("chunk_first: 1\n".to_string());
    spec.product = Some("Forge".to_string());
    let mut options = options();
    options.publican_show_remarks = true;
    options.cvs_pkg = Some("forge-docs".to_string());
    options.overrides.insert("version".to_string(), "2.1".to_string());
    options.overrides.insert("pubsnumber".to_string(), "7".to_string());

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    assert_eq!(
        file(&output, "Book/publican.cfg"),
        "xml_lang: en-US\ntype: Book\nbrand: RedHat\nchunk_first: 1\nshow_remarks: 1\ncvs_pkg: forge-docs\n"
    );
    let info = file(&output, "Book/en-US/Book_Info.xml");
    assert!(info.contains("<productname>Forge</productname>"));
    assert!(info.contains("<productnumber>2.1</productnumber>"));
    assert!(info.contains("<edition>1</edition>"));
    assert!(info.contains("<pubsnumber>7</pubsnumber>"));
    assert!(file(&output, "Book/en-US/Book.ent").contains("<!ENTITY PRODUCT \"Forge\">"));
    assert!(file(&output, "Book/en-US/topics/Alpha.xml").contains("product=Forge"));
}

#[test]
fn test_errors_chapter_lists_problems_in_the_build_locale() {
    init_logging();
    let store = store().with_topic(Topic::new(
        1,
        "Alpha",
        "<section><title>Alpha</title><para>unclosed</section>",
    ));
    let spec = ContentSpec::new("Book", "fr-FR").with_level(chapter("Guide", &[(1, "Alpha")]));
    let mut options = options();
    options.default_locale = "fr-FR".to_string();

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    let errors = file(&output, "Book/fr-FR/Errors.xml");
    assert!(!errors.contains("No Errors Found"));
    assert!(errors.contains("doesn't have well-formed xml"));
    assert!(errors.contains("<section id=\"TopicErrorID1\">"));
    assert_eq!(output.stats.errors, 1);
}

#[test]
fn test_inner_ids_never_reuse_topic_link_ids() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Alpha", "<para>a</para>"))
        .with_topic(topic(2, "Beta", "<para id=\"Alpha\">b</para><xref linkend=\"Alpha\"/>"))
        .with_topic(topic(3, "Gamma", "<para id=\"x\">c</para>"))
        .with_topic(topic(4, "Delta", "<para id=\"x\">d</para><para id=\"x-5\">e</para>"));
    let spec = ContentSpec::new("Book", "en-US").with_level(chapter(
        "Guide",
        &[(1, "Alpha"), (2, "Beta"), (3, "Gamma"), (4, "Delta")],
    ));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    let id_attribute = Regex::new(r#"\bid="([^"]+)""#).unwrap();
    let mut seen = HashSet::new();
    for path in output.manifest.paths().filter(|p| p.contains("/topics/")) {
        for caps in id_attribute.captures_iter(file(&output, path)) {
            let id = caps[1].to_string();
            assert!(seen.insert(id.clone()), "id {} appears twice, again in {}", id, path);
        }
    }
    assert!(seen.contains("Alpha"));
    assert!(seen.contains("x-5"));

    let beta = file(&output, "Book/en-US/topics/Beta.xml");
    assert!(!beta.contains("id=\"Alpha\""));
    assert!(!beta.contains("linkend=\"Alpha\""));
}

#[test]
fn test_topics_outside_chapters_leave_no_files() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Inside", "<para>i</para>"))
        .with_topic(topic(
            2,
            "Loose",
            "<para>l</para><mediaobject><imageobject><imagedata fileref=\"images/9.png\"/></imageobject></mediaobject>",
        ))
        .with_image(9, vec![9]);
    let mut spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Inside")]));
    spec.base_level.children.push(Node::Topic(SpecTopic::new(2, "Loose")));

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options(), None)
        .unwrap();

    assert!(output.manifest.contains("Book/en-US/topics/Inside.xml"));
    assert!(!output.manifest.contains("Book/en-US/topics/Loose.xml"));
    assert!(!output.manifest.contains("Book/en-US/images/9.png"));
    assert!(!file(&output, "Book/en-US/Book.xml").contains("Loose"));
}

#[test]
fn test_process_relationships_need_injection() {
    init_logging();
    let store = store()
        .with_topic(topic(1, "Download", "<para>d</para>"))
        .with_topic(topic(2, "Unpack", "<para>u</para>"));
    let spec = ContentSpec::new("Book", "en-US").with_level(
        Level::new(LevelType::Chapter, "Install Process")
            .with_topic(SpecTopic::new(1, "Download").with_relationship(RelationshipKind::Next, "T2"))
            .with_topic(SpecTopic::new(2, "Unpack").with_relationship(RelationshipKind::Prerequisite, "T1")),
    );
    let mut options = options();
    options.injection = Some(false);

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    let download = file(&output, "Book/en-US/topics/Download.xml");
    assert!(!download.contains("process-next"));
    assert!(!download.contains("linkend=\"Unpack\""));
    let unpack = file(&output, "Book/en-US/topics/Unpack.xml");
    assert!(!unpack.contains("prereqs-list"));
}

/// Store that cancels the build the first time a given call is made.
struct CancellingStore {
    inner: InMemoryTopicStore,
    cancel: CancellationToken,
    trigger: &'static str,
}

impl CancellingStore {
    fn hit(&self, call: &str) {
        if call == self.trigger {
            self.cancel.cancel();
        }
    }
}

impl TopicStore for CancellingStore {
    fn topics(&self, ids: &[i64]) -> Result<Vec<Topic>, StoreError> {
        self.hit("topics");
        self.inner.topics(ids)
    }

    fn translated_topics(&self, ids: &[i64], locale: &str) -> Result<Vec<TranslatedTopic>, StoreError> {
        self.inner.translated_topics(ids, locale)
    }

    fn topics_with_property(&self, property_id: i64, value: &str) -> Result<Vec<i64>, StoreError> {
        self.inner.topics_with_property(property_id, value)
    }

    fn update_topic_properties(&self, updates: &[TopicPropertyUpdate]) -> Result<(), StoreError> {
        self.hit("update_topic_properties");
        self.inner.update_topic_properties(updates)
    }

    fn string_constant(&self, id: i64) -> Result<String, StoreError> {
        self.inner.string_constant(id)
    }

    fn blob_constant(&self, id: i64) -> Result<Vec<u8>, StoreError> {
        self.hit("blob_constant");
        self.inner.blob_constant(id)
    }

    fn image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        self.hit("image");
        self.inner.image(id)
    }
}

#[test]
fn test_cancellation_during_build_returns_no_manifest() {
    init_logging();
    for trigger in ["topics", "update_topic_properties", "blob_constant", "image"] {
        let cancel = CancellationToken::new();
        let store = CancellingStore {
            inner: store().with_image(42, vec![4, 2]).with_topic(topic(
                1,
                "Pictures",
                "<mediaobject><imageobject><imagedata fileref=\"images/42.png\"/></imageobject></mediaobject>",
            )),
            cancel: cancel.clone(),
            trigger,
        };
        let spec = ContentSpec::new("Book", "en-US").with_level(chapter("Guide", &[(1, "Pictures")]));

        let result = BookBuilder::new(&store)
            .unwrap()
            .with_cancellation(cancel)
            .build(&spec, &options(), None);
        assert!(
            matches!(result, Err(BuildError::Cancelled)),
            "cancelling in {} gave {:?}",
            trigger,
            result.map(|output| output.stats)
        );
    }
}

#[test]
fn test_translated_build_warns_about_untranslated_related_topics() {
    init_logging();
    let mut alpha = topic(1, "Alpha", "<para>a</para>");
    let mut beta = topic(2, "Beta", "<para>b</para>");
    let mut outside = topic(3, "Outside", "<para>o</para>");
    alpha.relate_to(&mut beta);
    alpha.relate_to(&mut outside);
    let store = store().with_topic(alpha).with_topic(beta).with_topic(outside);
    let spec = ContentSpec::new("Book", "de-DE")
        .with_level(chapter("Guide", &[(1, "Alpha"), (2, "Beta")]));
    let mut options = options();
    options.ignore_missing_injections = true;

    let output = BookBuilder::new(&store)
        .unwrap()
        .build(&spec, &options, None)
        .unwrap();

    let errors = file(&output, "Book/de-DE/Errors.xml");
    assert!(errors.contains("Topic ID 2, Revision 1, Title \"[en-US] Beta\" is an untranslated topic."));
    assert!(!errors.contains("Topic ID 3,"));
    assert_eq!(output.stats.warnings, 3);
}
