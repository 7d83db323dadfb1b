use crate::state::{Library, BLOCK_FILTER_ORDER};

/// Sentinel sent to the backend when the user filters on "other components"
/// but the library has none; it matches no real block type, so the listing
/// comes back empty instead of unfiltered.
pub const OTHER_TYPES_PROBE: &str = "^";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Type(String),
    Other,
}

/// The filter/page tuple driving the block listing. Invariant: `page >= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    pub query: String,
    pub type_filter: TypeFilter,
    pub page: u32,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            query: String::new(),
            type_filter: TypeFilter::All,
            page: 1,
        }
    }
}

impl QueryState {
    /// Returns whether anything changed; unchanged input issues no fetch.
    pub fn set_query(&mut self, query: &str) -> bool {
        if self.query == query {
            return false;
        }
        self.query = query.to_string();
        self.page = 1;
        true
    }

    pub fn set_type_filter(&mut self, filter: TypeFilter) -> bool {
        if self.type_filter == filter {
            return false;
        }
        self.type_filter = filter;
        self.page = 1;
        true
    }

    /// Changes the page without touching query or filter.
    pub fn set_page(&mut self, page: u32) -> bool {
        let page = page.max(1);
        if self.page == page {
            return false;
        }
        self.page = page;
        true
    }

    /// Concrete type list for the search request. "Other" expands to every
    /// library block type outside the primary filter set.
    pub fn normalized_types(&self, library: Option<&Library>) -> Vec<String> {
        match &self.type_filter {
            TypeFilter::All => Vec::new(),
            TypeFilter::Type(block_type) => vec![block_type.clone()],
            TypeFilter::Other => {
                let types: Vec<String> = library
                    .map(|lib| {
                        lib.block_types
                            .iter()
                            .map(|spec| spec.block_type.clone())
                            .filter(|t| !BLOCK_FILTER_ORDER.contains(&t.as_str()))
                            .collect()
                    })
                    .unwrap_or_default();
                if types.is_empty() {
                    vec![OTHER_TYPES_PROBE.to_string()]
                } else {
                    types
                }
            }
        }
    }
}
