pub mod pagination;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::client::LibraryClient;
use crate::error::LibraryError;
use crate::state::{BlockAssets, BlockPage, Fetchable, Library, LtiClipboard};
use pagination::{creation_landing_page, last_page, overflow_target, reconcile, PageAction};
use query::{QueryState, TypeFilter};

pub const STUDENT_VIEW: &str = "student_view";

struct ControllerState {
    query: QueryState,
    // Bumped on every change that invalidates the listing; a search response
    // is applied only if its epoch is still current.
    search_epoch: u64,
    library: Fetchable<Library>,
    blocks: Fetchable<BlockPage>,
    block_assets: HashMap<String, BlockAssets>,
    lti_clipboard: Fetchable<LtiClipboard>,
    lti_requested: Option<String>,
    show_previews: bool,
    create_field_errors: HashMap<String, String>,
    action_error: Option<String>,
}

struct SearchRequest {
    epoch: u64,
    query: String,
    types: Vec<String>,
    page: u32,
}

fn snapshot_request(state: &mut ControllerState) -> SearchRequest {
    state.search_epoch += 1;
    state.blocks.start_loading();
    SearchRequest {
        epoch: state.search_epoch,
        query: state.query.query.clone(),
        types: state.query.normalized_types(state.library.value.as_ref()),
        page: state.query.page,
    }
}

/// Read-only view of the controller for rendering. Cloned out under the lock
/// so the host never observes a half-applied transition.
#[derive(Clone, Debug)]
pub struct ControllerSnapshot {
    pub query: QueryState,
    pub library: Fetchable<Library>,
    pub blocks: Fetchable<BlockPage>,
    pub last_page: u32,
    pub show_previews: bool,
    pub lti_clipboard: Fetchable<LtiClipboard>,
    pub create_field_errors: HashMap<String, String>,
    pub action_error: Option<String>,
}

/// Owns the listing query state for one mounted library page and keeps the
/// displayed collection converged with the backend as blocks are created and
/// deleted. Clones are cheap handles onto the same state.
#[derive(Clone)]
pub struct LibraryController {
    client: Arc<dyn LibraryClient>,
    library_id: Arc<str>,
    page_size: u32,
    state: Arc<Mutex<ControllerState>>,
}

impl LibraryController {
    /// Page size is injected here and never read from ambient state.
    pub fn new(
        client: Arc<dyn LibraryClient>,
        library_id: impl Into<String>,
        page_size: u32,
        show_previews: bool,
    ) -> Self {
        Self {
            client,
            library_id: library_id.into().into(),
            page_size: page_size.max(1),
            state: Arc::new(Mutex::new(ControllerState {
                query: QueryState::default(),
                search_epoch: 0,
                library: Fetchable::standby(),
                blocks: Fetchable::standby(),
                block_assets: HashMap::new(),
                lti_clipboard: Fetchable::standby(),
                lti_requested: None,
                show_previews,
                create_field_errors: HashMap::new(),
                action_error: None,
            })),
        }
    }

    /// Fetch library detail and the current block page concurrently. Also
    /// used to re-sync after a commit or revert.
    pub async fn load(&self) {
        let request = {
            let mut state = self.state.lock().await;
            state.library.start_loading();
            snapshot_request(&mut state)
        };

        let detail = self.client.fetch_library_detail(&self.library_id);
        let search = self.run_search(request);
        let (detail_result, _) = tokio::join!(detail, search);

        let mut state = self.state.lock().await;
        match detail_result {
            Ok(library) => state.library.resolve(library),
            Err(e) => {
                warn!("library detail fetch failed: {}", e);
                state.library.fail(e.to_string());
            }
        }
    }

    pub async fn change_query(&self, query: &str) {
        let request = {
            let mut state = self.state.lock().await;
            if !state.query.set_query(query) {
                debug!("query unchanged, no fetch");
                return;
            }
            snapshot_request(&mut state)
        };
        self.run_search(request).await;
    }

    pub async fn change_type_filter(&self, filter: TypeFilter) {
        let request = {
            let mut state = self.state.lock().await;
            if !state.query.set_type_filter(filter) {
                debug!("type filter unchanged, no fetch");
                return;
            }
            snapshot_request(&mut state)
        };
        self.run_search(request).await;
    }

    pub async fn change_page(&self, page: u32) {
        let request = {
            let mut state = self.state.lock().await;
            if !state.query.set_page(page) {
                debug!("page unchanged, no fetch");
                return;
            }
            snapshot_request(&mut state)
        };
        self.run_search(request).await;
    }

    /// Re-issue the current search, superseding any in-flight one.
    pub async fn refresh(&self) {
        let request = {
            let mut state = self.state.lock().await;
            snapshot_request(&mut state)
        };
        self.run_search(request).await;
    }

    /// Create a block and navigate to the page it lands on. The backend
    /// appends, so a creation against an exactly-full last page opens a new
    /// one.
    pub async fn add_block(&self, block_type: &str, definition_id: &str) {
        let landing = {
            let mut state = self.state.lock().await;
            state.create_field_errors.clear();
            state.action_error = None;
            let count = state.blocks.value.as_ref().map(|p| p.count).unwrap_or(0);
            creation_landing_page(count, self.page_size)
        };

        match self
            .client
            .create_block(&self.library_id, block_type, definition_id)
            .await
        {
            Ok(block) => {
                debug!("created block {} on page {}", block.id, landing);
                let request = {
                    let mut state = self.state.lock().await;
                    state.query.set_page(landing);
                    snapshot_request(&mut state)
                };
                self.run_search(request).await;
            }
            Err(LibraryError::Validation { field_errors }) => {
                warn!("block creation rejected: {} invalid field(s)", field_errors.len());
                let mut state = self.state.lock().await;
                state.create_field_errors = field_errors;
            }
            Err(e) => {
                warn!("block creation failed: {}", e);
                let mut state = self.state.lock().await;
                state.action_error = Some(e.to_string());
            }
        }
    }

    /// Delete a block, re-fetch the current page, and reconcile: an emptied
    /// trailing page steps the viewer back instead of stranding them.
    pub async fn delete_block(&self, block_id: &str) {
        {
            let mut state = self.state.lock().await;
            state.action_error = None;
        }

        if let Err(e) = self.client.delete_block(block_id).await {
            warn!("block deletion failed: {}", e);
            let mut state = self.state.lock().await;
            state.action_error = Some(e.to_string());
            return;
        }

        let request = {
            let mut state = self.state.lock().await;
            state.block_assets.remove(block_id);
            snapshot_request(&mut state)
        };
        let Some(applied) = self.run_search(request).await else {
            return;
        };

        let follow_up = {
            let mut state = self.state.lock().await;
            if state.search_epoch != applied {
                return;
            }
            let Some(page) = state.blocks.value.as_ref() else {
                return;
            };
            match reconcile(page.count, self.page_size, state.query.page, page.data.len()) {
                PageAction::Stay => None,
                // The re-fetch above already was the refresh.
                PageAction::RefreshOnly => None,
                PageAction::StepBack => {
                    let target = state.query.page - 1;
                    state.query.set_page(target);
                    Some(snapshot_request(&mut state))
                }
            }
        };
        if let Some(request) = follow_up {
            self.run_search(request).await;
        }
    }

    /// Lazily fetch a block's metadata and rendered view the first time it
    /// becomes visible. Only a Standby slot triggers a fetch; re-renders and
    /// repeat calls are free.
    pub async fn ensure_block_assets(&self, block_id: &str) {
        let (need_meta, need_view) = {
            let mut state = self.state.lock().await;
            if !state.show_previews {
                return;
            }
            let Some(assets) = state.block_assets.get_mut(block_id) else {
                // Not on the current page; the listing owns this map.
                return;
            };
            let need_meta = assets.metadata.is_standby();
            if need_meta {
                assets.metadata.start_loading();
            }
            let need_view = assets.view.is_standby();
            if need_view {
                assets.view.start_loading();
            }
            (need_meta, need_view)
        };
        if !need_meta && !need_view {
            return;
        }

        let meta = async {
            if need_meta {
                Some(self.client.fetch_block_metadata(block_id).await)
            } else {
                None
            }
        };
        let view = async {
            if need_view {
                Some(self.client.fetch_block_view(block_id, STUDENT_VIEW).await)
            } else {
                None
            }
        };
        let (meta, view) = tokio::join!(meta, view);

        let mut state = self.state.lock().await;
        let Some(assets) = state.block_assets.get_mut(block_id) else {
            debug!("block {} left the page before its assets arrived", block_id);
            return;
        };
        if let Some(result) = meta {
            match result {
                Ok(metadata) => assets.metadata.resolve(metadata),
                Err(e) => assets.metadata.fail(e.to_string()),
            }
        }
        if let Some(result) = view {
            match result {
                Ok(rendered) => assets.view.resolve(rendered),
                Err(e) => assets.view.fail(e.to_string()),
            }
        }
    }

    /// Generate an LTI launch URL into the single clipboard slot. A request
    /// already in flight is not duplicated.
    pub async fn generate_lti_url(&self, block_id: &str) {
        {
            let mut state = self.state.lock().await;
            let allowed = state
                .library
                .value
                .as_ref()
                .map(|lib| lib.allow_lti)
                .unwrap_or(false);
            if !allowed {
                warn!("LTI URLs are not enabled for this library");
                return;
            }
            if state.lti_clipboard.is_loading() {
                debug!("LTI URL generation already in flight");
                return;
            }
            state.lti_clipboard.start_loading();
            state.lti_requested = Some(block_id.to_string());
        }

        let result = self.client.fetch_block_lti_url(block_id).await;

        let mut state = self.state.lock().await;
        if state.lti_requested.as_deref() != Some(block_id) {
            debug!("dropping LTI URL for superseded block {}", block_id);
            return;
        }
        match result {
            Ok(lti_url) => state.lti_clipboard.resolve(LtiClipboard {
                block_id: block_id.to_string(),
                lti_url,
            }),
            Err(e) => {
                warn!("LTI URL generation failed: {}", e);
                state.lti_clipboard.fail(e.to_string());
            }
        }
    }

    pub async fn commit_changes(&self) {
        self.publish(true).await;
    }

    pub async fn revert_changes(&self) {
        self.publish(false).await;
    }

    async fn publish(&self, commit: bool) {
        {
            let mut state = self.state.lock().await;
            state.action_error = None;
        }
        let result = if commit {
            self.client.commit_library_changes(&self.library_id).await
        } else {
            self.client.revert_library_changes(&self.library_id).await
        };
        if let Err(e) = result {
            warn!(
                "{} failed: {}",
                if commit { "commit" } else { "revert" },
                e
            );
            let mut state = self.state.lock().await;
            state.action_error = Some(e.to_string());
            return;
        }
        // Detail flags and the listing both change; re-sync everything.
        self.load().await;
    }

    pub async fn set_show_previews(&self, value: bool) {
        let mut state = self.state.lock().await;
        state.show_previews = value;
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.lock().await;
        let count = state.blocks.value.as_ref().map(|p| p.count).unwrap_or(0);
        ControllerSnapshot {
            query: state.query.clone(),
            library: state.library.clone(),
            blocks: state.blocks.clone(),
            last_page: last_page(count, self.page_size),
            show_previews: state.show_previews,
            lti_clipboard: state.lti_clipboard.clone(),
            create_field_errors: state.create_field_errors.clone(),
            action_error: state.action_error.clone(),
        }
    }

    pub async fn block_assets(&self, block_id: &str) -> Option<BlockAssets> {
        let state = self.state.lock().await;
        state.block_assets.get(block_id).cloned()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Issues the search and applies the response unless it has been
    /// superseded. A response for a page past the end of the collection is
    /// corrected to the last page and re-fetched; the correction uses the
    /// count returned by that response, so it converges in one extra trip.
    /// Returns the epoch of the applied result, or None when the response was
    /// dropped or the fetch failed.
    async fn run_search(&self, mut request: SearchRequest) -> Option<u64> {
        loop {
            debug!(
                "searching blocks: page={} types={:?} query={:?}",
                request.page, request.types, request.query
            );
            let result = self
                .client
                .search_blocks(
                    &self.library_id,
                    &request.query,
                    &request.types,
                    request.page,
                    self.page_size,
                )
                .await;

            let next = {
                let mut state = self.state.lock().await;
                if state.search_epoch != request.epoch {
                    debug!("dropping superseded search response for page {}", request.page);
                    return None;
                }
                match result {
                    Ok(page) => {
                        if let Some(target) =
                            overflow_target(page.count, self.page_size, request.page)
                        {
                            debug!("page {} is past the end, stepping to {}", request.page, target);
                            state.query.set_page(target);
                            snapshot_request(&mut state)
                        } else {
                            state
                                .block_assets
                                .retain(|id, _| page.data.iter().any(|b| &b.id == id));
                            for block in &page.data {
                                state.block_assets.entry(block.id.clone()).or_default();
                            }
                            state.blocks.resolve(page);
                            return Some(request.epoch);
                        }
                    }
                    Err(e) => {
                        warn!("block search failed: {}", e);
                        state.blocks.fail(e.to_string());
                        return None;
                    }
                }
            };
            request = next;
        }
    }
}
