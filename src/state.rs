use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Block types offered as primary filter options; everything else is grouped
/// under "other components".
pub const BLOCK_FILTER_ORDER: &[&str] = &["video", "html", "problem"];

/// Block types whose editor view is not usable from the listing.
pub const BLOCK_TYPE_EDIT_DENYLIST: &[&str] = &["video", "drag-and-drop-v2"];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Standby,
    Loading,
    Loaded,
    Failed,
}

/// Load state of one async resource: a value (kept across re-fetches so the
/// previous page stays visible while the next one loads), a status, and the
/// last error if the fetch failed.
#[derive(Serialize, Clone, Debug)]
pub struct Fetchable<T> {
    pub value: Option<T>,
    pub status: FetchStatus,
    pub error: Option<String>,
}

impl<T> Fetchable<T> {
    pub fn standby() -> Self {
        Self {
            value: None,
            status: FetchStatus::Standby,
            error: None,
        }
    }

    pub fn start_loading(&mut self) {
        self.status = FetchStatus::Loading;
        self.error = None;
    }

    pub fn resolve(&mut self, value: T) {
        self.value = Some(value);
        self.status = FetchStatus::Loaded;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = FetchStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn is_standby(&self) -> bool {
        self.status == FetchStatus::Standby
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.status == FetchStatus::Loaded
    }
}

impl<T> Default for Fetchable<T> {
    fn default() -> Self {
        Self::standby()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    Legacy,
    Complex,
}

fn default_library_type() -> LibraryType {
    LibraryType::Complex
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockTypeSpec {
    pub block_type: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Library {
    pub id: String,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub allow_lti: bool,
    #[serde(default)]
    pub has_unpublished_changes: bool,
    #[serde(default)]
    pub has_unpublished_deletes: bool,
    #[serde(rename = "type", default = "default_library_type")]
    pub library_type: LibraryType,
    #[serde(default)]
    pub block_types: Vec<BlockTypeSpec>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl Library {
    pub fn has_pending_changes(&self) -> bool {
        self.has_unpublished_changes || self.has_unpublished_deletes
    }

    /// Block types outside the primary filter set, for the "other components"
    /// add menu.
    pub fn other_block_types(&self) -> Vec<&BlockTypeSpec> {
        self.block_types
            .iter()
            .filter(|spec| !BLOCK_FILTER_ORDER.contains(&spec.block_type.as_str()))
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Block {
    pub id: String,
    pub display_name: String,
    pub block_type: String,
    #[serde(default)]
    pub has_unpublished_changes: bool,
}

/// One page of listing results, replaced wholesale on each successful fetch.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BlockPage {
    #[serde(default)]
    pub data: Vec<Block>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockMetadata {
    pub id: String,
    pub display_name: String,
    pub block_type: String,
}

impl BlockMetadata {
    pub fn can_edit(&self) -> bool {
        !BLOCK_TYPE_EDIT_DENYLIST.contains(&self.block_type.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ViewResource {
    pub kind: String,
    pub data: String,
}

/// Rendered view of a block as returned by the view endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockView {
    pub content: String,
    #[serde(default)]
    pub resources: Vec<ViewResource>,
}

/// Richer per-block data fetched lazily and independently of the listing.
#[derive(Clone, Debug, Default)]
pub struct BlockAssets {
    pub metadata: Fetchable<BlockMetadata>,
    pub view: Fetchable<BlockView>,
}

#[derive(Serialize, Clone, Debug)]
pub struct LtiClipboard {
    pub block_id: String,
    pub lti_url: String,
}

static LIBRARY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^library-v1:(?<org>.+)\+(?<slug>.+)$").unwrap());

/// Unpack a v1 library key into (org, slug).
pub fn unpack_library_key(key: &str) -> Option<(String, String)> {
    let caps = LIBRARY_KEY.captures(key)?;
    Some((caps["org"].to_string(), caps["slug"].to_string()))
}
