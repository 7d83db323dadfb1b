//! Client-side core for a content block library authoring tool: paginated
//! block listing with search and type filters, page reconciliation under
//! creation and deletion, and lazy per-block asset loading.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod state;

pub use client::{HttpLibraryClient, LibraryClient};
pub use config::{load_config, AuthoringConfig, ConfigState};
pub use controller::query::{QueryState, TypeFilter};
pub use controller::{ControllerSnapshot, LibraryController};
pub use error::{ClientResult, LibraryError};
pub use state::{Fetchable, FetchStatus};
