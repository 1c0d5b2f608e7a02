//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};

use docbook_forge::store::{
    DOCBOOK_DTD_BLOB_ID, FAILPENGUIN_PNG_BLOB_ID, ICON_SVG_STRING_ID, PUBLICAN_CFG_STRING_ID,
    SKYNET_BLOB_ASSETS, SKYNET_STRING_ASSETS,
};
use docbook_forge::{BuildOutput, BuildingOptions, InMemoryTopicStore, Topic};

pub const PUBLICAN_CFG: &str = "xml_lang: en-US\ntype: Book\nbrand: <<contentSpec.brand>>\n";
pub const PENGUIN: &[u8] = b"failpenguin";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Store holding every constant a build needs. The DTD is empty, so every
/// well-formed topic validates.
pub fn store() -> InMemoryTopicStore {
    store_with_dtd("")
}

pub fn store_with_dtd(dtd: &str) -> InMemoryTopicStore {
    let mut store = InMemoryTopicStore::new()
        .with_blob_constant(DOCBOOK_DTD_BLOB_ID, dtd.as_bytes().to_vec())
        .with_string_constant(PUBLICAN_CFG_STRING_ID, PUBLICAN_CFG)
        .with_string_constant(ICON_SVG_STRING_ID, "<svg/>")
        .with_blob_constant(FAILPENGUIN_PNG_BLOB_ID, PENGUIN.to_vec());
    for &(id, file) in SKYNET_STRING_ASSETS {
        store = store.with_string_constant(id, format!("/* {} */", file));
    }
    for &(id, _) in SKYNET_BLOB_ASSETS {
        store = store.with_blob_constant(id, vec![0x47, 0x49, 0x46]);
    }
    store
}

/// A topic whose XML is a section titled like the topic.
pub fn topic(id: i64, title: &str, body: &str) -> Topic {
    Topic::new(
        id,
        title,
        format!("<section><title>{}</title>{}</section>", title, body),
    )
}

pub fn options() -> BuildingOptions {
    BuildingOptions {
        build_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single(),
        ..BuildingOptions::default()
    }
}

pub fn file<'a>(output: &'a BuildOutput, path: &str) -> &'a str {
    output
        .manifest
        .get_str(path)
        .unwrap_or_else(|| panic!("missing {}, have {:?}", path, output.manifest.paths().collect::<Vec<_>>()))
}
