//! Topic store boundary.
//!
//! The builder never talks to a concrete backend; it goes through
//! [`TopicStore`]. [`InMemoryTopicStore`] is a complete implementation kept in
//! memory, used for embedding and tests.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::topic::{PropertyTag, Tag, Topic, TranslatedTopic};

pub use memory::InMemoryTopicStore;

/// DocBook DTD body used to validate processed topics.
pub const DOCBOOK_DTD_BLOB_ID: i64 = 9;
/// Base `publican.cfg`.
pub const PUBLICAN_CFG_STRING_ID: i64 = 15;
pub const ICON_SVG_STRING_ID: i64 = 5;
/// Placeholder image for unresolvable image references.
pub const FAILPENGUIN_PNG_BLOB_ID: i64 = 6;

pub const JBOSS_SVG_STRING_ID: i64 = 18;
pub const YAHOO_DOM_EVENT_JS_STRING_ID: i64 = 19;
pub const TREEVIEW_MIN_JS_STRING_ID: i64 = 20;
pub const TREEVIEW_CSS_STRING_ID: i64 = 21;
pub const JQUERY_MIN_JS_STRING_ID: i64 = 22;
pub const TREEVIEW_SPRITE_GIF_BLOB_ID: i64 = 23;
pub const TREEVIEW_LOADING_GIF_BLOB_ID: i64 = 24;

/// Text assets added to Skynet-style books, relative to the locale folder.
pub const SKYNET_STRING_ASSETS: &[(i64, &str)] = &[
    (JBOSS_SVG_STRING_ID, "images/jboss.svg"),
    (YAHOO_DOM_EVENT_JS_STRING_ID, "files/yahoo-dom-event.js"),
    (TREEVIEW_MIN_JS_STRING_ID, "files/treeview-min.js"),
    (TREEVIEW_CSS_STRING_ID, "files/treeview.css"),
    (JQUERY_MIN_JS_STRING_ID, "files/jquery.min.js"),
];

/// Binary assets added to Skynet-style books, relative to the locale folder.
pub const SKYNET_BLOB_ASSETS: &[(i64, &str)] = &[
    (TREEVIEW_SPRITE_GIF_BLOB_ID, "files/treeview-sprite.gif"),
    (TREEVIEW_LOADING_GIF_BLOB_ID, "files/treeview-loading.gif"),
];

/// One entry of a batched property update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPropertyUpdate {
    pub topic_id: i64,
    pub add: PropertyTag,
    /// Stale properties to drop in the same update
    pub remove: Vec<PropertyTag>,
}

/// Writer details attached to an author tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInformation {
    pub author_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub org_division: Option<String>,
}

/// Remote source of topics, translations and build constants.
///
/// Any call may fail with a [`StoreError`]. Only the stable-address pass
/// retries; every other failure aborts the build.
pub trait TopicStore {
    /// Fetch topics by id. Unknown ids are left out of the result.
    fn topics(&self, ids: &[i64]) -> Result<Vec<Topic>, StoreError>;

    /// Fetch the translations of the given source topic ids in `locale`.
    fn translated_topics(
        &self,
        ids: &[i64],
        locale: &str,
    ) -> Result<Vec<TranslatedTopic>, StoreError>;

    /// Ids of topics carrying property `property_id` with exactly `value`.
    fn topics_with_property(&self, property_id: i64, value: &str)
        -> Result<Vec<i64>, StoreError>;

    /// Persist a batch of property changes in one call.
    fn update_topic_properties(&self, updates: &[TopicPropertyUpdate]) -> Result<(), StoreError>;

    fn string_constant(&self, id: i64) -> Result<String, StoreError>;

    fn blob_constant(&self, id: i64) -> Result<Vec<u8>, StoreError>;

    /// Image bytes, or `None` if no image has that id.
    fn image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError>;

    fn author_information(&self, _author_tag_id: i64) -> Result<Option<AuthorInformation>, StoreError> {
        Ok(None)
    }

    fn tags_by_name(&self, _name: &str) -> Result<Vec<Tag>, StoreError> {
        Ok(Vec::new())
    }
}
