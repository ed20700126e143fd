//! Collection names, schema versions, and the two schema registries.
//!
//! The device-local schema is denormalized for on-device queries; the
//! canonical schema is normalized, deduplicated, and scoped by user.
//! Both are declared statically here and validated at construction.

use marksync_storage::{CollectionDef, FieldType, PrimaryKey, Registry, StorageResult};

/// Device-local collection names.
pub mod local {
    /// Visited/saved pages, keyed by normalized URL.
    pub const PAGES: &str = "pages";
    /// Physical content locators (e.g. PDF fingerprints).
    pub const LOCATORS: &str = "locators";
    /// Visit events.
    pub const VISITS: &str = "visits";
    /// Bookmarks.
    pub const BOOKMARKS: &str = "bookmarks";
    /// Tag connections, keyed by (name, url).
    pub const TAGS: &str = "tags";
    /// Annotations/highlights, keyed by annotation URL.
    pub const ANNOTATIONS: &str = "annotations";
    /// Per-annotation privacy levels.
    pub const ANNOTATION_PRIVACY_LEVELS: &str = "annotation_privacy_levels";
    /// Per-annotation share state (remote id of the shared copy).
    pub const SHARED_ANNOTATION_METADATA: &str = "shared_annotation_metadata";
    /// User-created lists/collections.
    pub const CUSTOM_LISTS: &str = "custom_lists";
    /// Free-text list descriptions.
    pub const LIST_DESCRIPTIONS: &str = "list_descriptions";
    /// Page memberships in lists.
    pub const LIST_ENTRIES: &str = "list_entries";
    /// Annotation memberships in lists.
    pub const ANNOTATION_LIST_ENTRIES: &str = "annotation_list_entries";
    /// Per-list share state (remote id of the shared list).
    pub const SHARED_LIST_METADATA: &str = "shared_list_metadata";
    /// Followed lists, materialized from the cloud.
    pub const FOLLOWED_LISTS: &str = "followed_lists";
    /// Extension settings.
    pub const SETTINGS: &str = "settings";
    /// Text export templates.
    pub const TEMPLATES: &str = "templates";
}

/// Canonical (per-user, normalized) collection names.
pub mod canonical {
    /// One row per distinct piece of content.
    pub const CONTENT_METADATA: &str = "personal_content_metadata";
    /// Where/how content is reachable; every metadata has at least one.
    pub const CONTENT_LOCATOR: &str = "personal_content_locator";
    /// Read/visit events.
    pub const CONTENT_READ: &str = "personal_content_read";
    /// Per-user storage quota accounting.
    pub const BLOCK_STATS: &str = "personal_block_stats";
    /// Bookmarks.
    pub const BOOKMARK: &str = "personal_bookmark";
    /// Deduplicated tag names.
    pub const TAG: &str = "personal_tag";
    /// Many-to-many tag edges.
    pub const TAG_CONNECTION: &str = "personal_tag_connection";
    /// Annotations.
    pub const ANNOTATION: &str = "personal_annotation";
    /// Annotation anchoring selectors.
    pub const ANNOTATION_SELECTOR: &str = "personal_annotation_selector";
    /// Annotation privacy levels.
    pub const ANNOTATION_PRIVACY_LEVEL: &str = "personal_annotation_privacy_level";
    /// Links from annotations to their shared copies.
    pub const ANNOTATION_SHARE: &str = "personal_annotation_share";
    /// Lists.
    pub const LIST: &str = "personal_list";
    /// Page memberships in lists.
    pub const LIST_ENTRY: &str = "personal_list_entry";
    /// List descriptions.
    pub const LIST_DESCRIPTION: &str = "personal_list_description";
    /// Links from lists to their shared copies.
    pub const LIST_SHARE: &str = "personal_list_share";
    /// Annotation memberships in lists.
    pub const ANNOTATION_LIST_ENTRY: &str = "personal_annotation_list_entry";
    /// Followed shared lists.
    pub const FOLLOWED_LIST: &str = "personal_followed_list";
    /// Queued Readwise re-export actions.
    pub const READWISE_ACTION: &str = "personal_readwise_action";
    /// Synced settings.
    pub const SETTING: &str = "personal_setting";
    /// Text export templates.
    pub const TEXT_TEMPLATE: &str = "personal_text_template";
    /// Known devices of a user.
    pub const DEVICE_INFO: &str = "personal_device_info";
}

/// Cross-user shared-content collection names.
pub mod shared {
    /// Publicly shared lists.
    pub const LIST: &str = "shared_list";
    /// Publicly shared annotations.
    pub const ANNOTATION: &str = "shared_annotation";
    /// Shared annotation memberships in shared lists.
    pub const ANNOTATION_LIST_ENTRY: &str = "shared_annotation_list_entry";
}

/// Local collections that sync to the personal cloud, in capture order.
///
/// The translation schema map is validated for completeness against this
/// set at startup. `followed_lists` is download-only and therefore not
/// listed here.
pub const SYNCED_COLLECTIONS: &[&str] = &[
    local::PAGES,
    local::LOCATORS,
    local::VISITS,
    local::BOOKMARKS,
    local::TAGS,
    local::ANNOTATIONS,
    local::ANNOTATION_PRIVACY_LEVELS,
    local::SHARED_ANNOTATION_METADATA,
    local::CUSTOM_LISTS,
    local::LIST_DESCRIPTIONS,
    local::LIST_ENTRIES,
    local::ANNOTATION_LIST_ENTRIES,
    local::SHARED_LIST_METADATA,
    local::SETTINGS,
    local::TEMPLATES,
];

/// A client build's schema version.
///
/// Download omits collections a client's build does not yet understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SchemaVersion(pub u32);

/// First client version that understands the flat `locators` collection.
pub const LOCATORS_SINCE_VERSION: SchemaVersion = SchemaVersion(25);

/// The schema version current clients declare.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion(26);

/// Builds the device-local schema registry.
pub fn local_registry() -> StorageResult<Registry> {
    use FieldType::*;
    Registry::from_defs(vec![
        CollectionDef::new(local::PAGES, PrimaryKey::Fields(&["url"]))
            .field("url", Text)
            .field_opt("title", Text)
            .field_opt("full_url", Text),
        CollectionDef::new(local::LOCATORS, PrimaryKey::Fields(&["url", "location"]))
            .field("url", Text)
            .field("location", Text)
            .field("location_type", Text)
            .field_opt("fingerprint", Text)
            .field_opt("format", Text)
            .field_opt("last_visited", Timestamp)
            .relationship("url", local::PAGES),
        CollectionDef::new(local::VISITS, PrimaryKey::Fields(&["url", "time"]))
            .field("url", Text)
            .field("time", Timestamp)
            .field_opt("duration", Int)
            .relationship("url", local::PAGES),
        CollectionDef::new(local::BOOKMARKS, PrimaryKey::Fields(&["url"]))
            .field("url", Text)
            .field("time", Timestamp)
            .relationship("url", local::PAGES),
        CollectionDef::new(local::TAGS, PrimaryKey::Fields(&["name", "url"]))
            .field("name", Text)
            .field("url", Text),
        CollectionDef::new(local::ANNOTATIONS, PrimaryKey::Fields(&["url"]))
            .field("url", Text)
            .field("page_url", Text)
            .field_opt("body", Text)
            .field_opt("comment", Text)
            .field_opt("selector", Json)
            .field("created_when", Timestamp)
            .relationship("page_url", local::PAGES),
        CollectionDef::new(
            local::ANNOTATION_PRIVACY_LEVELS,
            PrimaryKey::Fields(&["annotation"]),
        )
        .field("annotation", Text)
        .field("privacy_level", Int)
        .field("created_when", Timestamp)
        .relationship("annotation", local::ANNOTATIONS),
        CollectionDef::new(
            local::SHARED_ANNOTATION_METADATA,
            PrimaryKey::Fields(&["local_id"]),
        )
        .field("local_id", Text)
        .field("remote_id", Text)
        .field_opt("exclude_from_lists", Bool)
        .relationship("local_id", local::ANNOTATIONS),
        CollectionDef::new(local::CUSTOM_LISTS, PrimaryKey::AutoId)
            .field("name", Text)
            .field("created_at", Timestamp)
            .field_opt("is_nestable", Bool),
        CollectionDef::new(local::LIST_DESCRIPTIONS, PrimaryKey::Fields(&["list_id"]))
            .field("list_id", Int)
            .field("description", Text)
            .relationship("list_id", local::CUSTOM_LISTS),
        CollectionDef::new(
            local::LIST_ENTRIES,
            PrimaryKey::Fields(&["list_id", "page_url"]),
        )
        .field("list_id", Int)
        .field("page_url", Text)
        .field("created_at", Timestamp)
        .relationship("list_id", local::CUSTOM_LISTS)
        .relationship("page_url", local::PAGES),
        CollectionDef::new(
            local::ANNOTATION_LIST_ENTRIES,
            PrimaryKey::Fields(&["list_id", "annotation_url"]),
        )
        .field("list_id", Int)
        .field("annotation_url", Text)
        .field("created_at", Timestamp)
        .relationship("list_id", local::CUSTOM_LISTS)
        .relationship("annotation_url", local::ANNOTATIONS),
        CollectionDef::new(
            local::SHARED_LIST_METADATA,
            PrimaryKey::Fields(&["local_id"]),
        )
        .field("local_id", Int)
        .field("remote_id", Text)
        .relationship("local_id", local::CUSTOM_LISTS),
        CollectionDef::new(local::FOLLOWED_LISTS, PrimaryKey::Fields(&["shared_list"]))
            .field("shared_list", Text)
            .field("name", Text)
            .field_opt("creator", Text),
        CollectionDef::new(local::SETTINGS, PrimaryKey::Fields(&["key"]))
            .field("key", Text)
            .field("value", Json),
        CollectionDef::new(local::TEMPLATES, PrimaryKey::AutoId)
            .field("title", Text)
            .field("code", Text)
            .field_opt("is_favourite", Bool),
    ])
}

/// Builds the canonical schema registry, including the cross-user
/// shared-content collections.
pub fn canonical_registry() -> StorageResult<Registry> {
    use FieldType::*;
    let user_scoped = |name: &'static str| {
        CollectionDef::new(name, PrimaryKey::AutoId)
            .field("user", Text)
            .field_opt("created_by_device", Int)
            .field("created_when", Timestamp)
    };
    Registry::from_defs(vec![
        user_scoped(canonical::CONTENT_METADATA)
            .field("canonical_url", Text)
            .field_opt("title", Text)
            .field_opt("full_url", Text),
        user_scoped(canonical::CONTENT_LOCATOR)
            .field("metadata", Int)
            .field("location_type", Text)
            .field("location", Text)
            .field("is_primary", Bool)
            .field("valid", Bool)
            .field_opt("fingerprint", Text)
            .field_opt("format", Text)
            .field_opt("last_visited", Timestamp)
            .relationship("metadata", canonical::CONTENT_METADATA),
        user_scoped(canonical::CONTENT_READ)
            .field("metadata", Int)
            .field("read_when", Timestamp)
            .field_opt("duration", Int)
            .relationship("metadata", canonical::CONTENT_METADATA),
        user_scoped(canonical::BLOCK_STATS).field("used_blocks", Int),
        user_scoped(canonical::BOOKMARK)
            .field("metadata", Int)
            .relationship("metadata", canonical::CONTENT_METADATA),
        user_scoped(canonical::TAG).field("name", Text),
        user_scoped(canonical::TAG_CONNECTION)
            .field("tag", Int)
            .field("target_collection", Text)
            .field("target_id", Int)
            .relationship("tag", canonical::TAG),
        user_scoped(canonical::ANNOTATION)
            .field("metadata", Int)
            .field("local_id", Text)
            .field_opt("body", Text)
            .field_opt("comment", Text)
            .relationship("metadata", canonical::CONTENT_METADATA),
        user_scoped(canonical::ANNOTATION_SELECTOR)
            .field("annotation", Int)
            .field("selector", Json)
            .relationship("annotation", canonical::ANNOTATION),
        user_scoped(canonical::ANNOTATION_PRIVACY_LEVEL)
            .field("annotation", Int)
            .field("level", Int)
            .relationship("annotation", canonical::ANNOTATION),
        user_scoped(canonical::ANNOTATION_SHARE)
            .field("annotation", Int)
            .field("remote_id", Text)
            .field_opt("exclude_from_lists", Bool)
            .relationship("annotation", canonical::ANNOTATION),
        user_scoped(canonical::LIST)
            .field("local_id", Int)
            .field("name", Text)
            .field_opt("is_nestable", Bool),
        user_scoped(canonical::LIST_ENTRY)
            .field("list", Int)
            .field("metadata", Int)
            .relationship("list", canonical::LIST)
            .relationship("metadata", canonical::CONTENT_METADATA),
        user_scoped(canonical::LIST_DESCRIPTION)
            .field("list", Int)
            .field("description", Text)
            .relationship("list", canonical::LIST),
        user_scoped(canonical::LIST_SHARE)
            .field("list", Int)
            .field("remote_id", Text)
            .relationship("list", canonical::LIST),
        user_scoped(canonical::ANNOTATION_LIST_ENTRY)
            .field("list", Int)
            .field("annotation", Int)
            .relationship("list", canonical::LIST)
            .relationship("annotation", canonical::ANNOTATION),
        user_scoped(canonical::FOLLOWED_LIST)
            .field("shared_list", Text)
            .field("name", Text)
            .field_opt("creator", Text),
        user_scoped(canonical::READWISE_ACTION)
            .field("annotation", Int)
            .relationship("annotation", canonical::ANNOTATION),
        user_scoped(canonical::SETTING)
            .field("key", Text)
            .field("value", Json),
        user_scoped(canonical::TEXT_TEMPLATE)
            .field("local_id", Int)
            .field("title", Text)
            .field("code", Text)
            .field_opt("is_favourite", Bool),
        user_scoped(canonical::DEVICE_INFO)
            .field("device_type", Text)
            .field_opt("product_type", Text),
        // Cross-user shared content.
        CollectionDef::new(shared::LIST, PrimaryKey::AutoId)
            .field("remote_id", Text)
            .field("creator", Text)
            .field("title", Text)
            .field_opt("description", Text)
            .field("created_when", Timestamp),
        CollectionDef::new(shared::ANNOTATION, PrimaryKey::AutoId)
            .field("remote_id", Text)
            .field("creator", Text)
            .field("normalized_page_url", Text)
            .field_opt("body", Text)
            .field_opt("comment", Text)
            .field("created_when", Timestamp)
            .field("updated_when", Timestamp),
        CollectionDef::new(shared::ANNOTATION_LIST_ENTRY, PrimaryKey::AutoId)
            .field("creator", Text)
            .field("shared_list", Int)
            .field("shared_annotation", Int)
            .field("created_when", Timestamp)
            .relationship("shared_list", shared::LIST)
            .relationship("shared_annotation", shared::ANNOTATION),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_registry_builds() {
        let registry = local_registry().unwrap();
        for name in SYNCED_COLLECTIONS {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(registry.contains(local::FOLLOWED_LISTS));
    }

    #[test]
    fn canonical_registry_builds() {
        let registry = canonical_registry().unwrap();
        assert!(registry.contains(canonical::CONTENT_METADATA));
        assert!(registry.contains(canonical::BLOCK_STATS));
        assert!(registry.contains(shared::LIST));
    }

    #[test]
    fn schema_versions_order() {
        assert!(LOCATORS_SINCE_VERSION < CURRENT_SCHEMA_VERSION);
        assert!(SchemaVersion(24) < LOCATORS_SINCE_VERSION);
    }
}
