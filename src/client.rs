use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ClientResult, LibraryError};
use crate::state::{Block, BlockMetadata, BlockPage, BlockView, Library};

/// Backend seam for the authoring controller. Implemented over HTTP in
/// production and by an in-memory backend in controller tests.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    async fn fetch_library_detail(&self, library_id: &str) -> ClientResult<Library>;

    async fn search_blocks(
        &self,
        library_id: &str,
        query: &str,
        types: &[String],
        page: u32,
        page_size: u32,
    ) -> ClientResult<BlockPage>;

    async fn create_block(
        &self,
        library_id: &str,
        block_type: &str,
        definition_id: &str,
    ) -> ClientResult<Block>;

    async fn delete_block(&self, block_id: &str) -> ClientResult<()>;

    async fn fetch_block_metadata(&self, block_id: &str) -> ClientResult<BlockMetadata>;

    async fn fetch_block_view(&self, block_id: &str, view_name: &str) -> ClientResult<BlockView>;

    async fn fetch_block_lti_url(&self, block_id: &str) -> ClientResult<String>;

    async fn commit_library_changes(&self, library_id: &str) -> ClientResult<()>;

    async fn revert_library_changes(&self, library_id: &str) -> ClientResult<()>;
}

pub struct HttpLibraryClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CreateBlockRequest<'a> {
    block_type: &'a str,
    definition_id: &'a str,
}

#[derive(Deserialize)]
struct LtiUrlResponse {
    lti_url: String,
}

impl HttpLibraryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ClientResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| LibraryError::Network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| LibraryError::Decode(e.to_string()))
    }
}

async fn error_from_response(response: reqwest::Response) -> LibraryError {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::NOT_FOUND {
        return LibraryError::NotFound(url);
    }

    if status == reqwest::StatusCode::BAD_REQUEST {
        // Field validation errors arrive as a flat JSON object.
        if let Ok(fields) = serde_json::from_str::<HashMap<String, serde_json::Value>>(&body) {
            let field_errors = fields
                .into_iter()
                .map(|(field, message)| {
                    let message = match message {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (field, message)
                })
                .collect();
            return LibraryError::Validation { field_errors };
        }
    }

    LibraryError::Api {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl LibraryClient for HttpLibraryClient {
    async fn fetch_library_detail(&self, library_id: &str) -> ClientResult<Library> {
        let url = format!("{}/api/libraries/v2/{}/", self.base_url, library_id);
        self.json(self.client.get(&url)).await
    }

    async fn search_blocks(
        &self,
        library_id: &str,
        query: &str,
        types: &[String],
        page: u32,
        page_size: u32,
    ) -> ClientResult<BlockPage> {
        let url = format!("{}/api/libraries/v2/{}/blocks/", self.base_url, library_id);

        let mut params: Vec<(&str, String)> = vec![
            ("pagination", "true".to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if !query.is_empty() {
            params.push(("text_search", query.to_string()));
        }
        for block_type in types {
            params.push(("block_type", block_type.clone()));
        }

        debug!(
            "search_blocks: library={} page={} types={:?} query={:?}",
            library_id, page, types, query
        );
        self.json(self.client.get(&url).query(&params)).await
    }

    async fn create_block(
        &self,
        library_id: &str,
        block_type: &str,
        definition_id: &str,
    ) -> ClientResult<Block> {
        let url = format!("{}/api/libraries/v2/{}/blocks/", self.base_url, library_id);
        let body = CreateBlockRequest {
            block_type,
            definition_id,
        };
        self.json(self.client.post(&url).json(&body)).await
    }

    async fn delete_block(&self, block_id: &str) -> ClientResult<()> {
        let url = format!("{}/api/libraries/v2/blocks/{}/", self.base_url, block_id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn fetch_block_metadata(&self, block_id: &str) -> ClientResult<BlockMetadata> {
        let url = format!("{}/api/libraries/v2/blocks/{}/", self.base_url, block_id);
        self.json(self.client.get(&url)).await
    }

    async fn fetch_block_view(&self, block_id: &str, view_name: &str) -> ClientResult<BlockView> {
        let url = format!("{}/xblock/v2/{}/view/{}/", self.base_url, block_id, view_name);
        self.json(self.client.get(&url)).await
    }

    async fn fetch_block_lti_url(&self, block_id: &str) -> ClientResult<String> {
        let url = format!("{}/api/libraries/v2/blocks/{}/lti/", self.base_url, block_id);
        let response: LtiUrlResponse = self.json(self.client.get(&url)).await?;
        Ok(response.lti_url)
    }

    async fn commit_library_changes(&self, library_id: &str) -> ClientResult<()> {
        let url = format!("{}/api/libraries/v2/{}/commit/", self.base_url, library_id);
        self.send(self.client.post(&url)).await?;
        Ok(())
    }

    async fn revert_library_changes(&self, library_id: &str) -> ClientResult<()> {
        let url = format!("{}/api/libraries/v2/{}/commit/", self.base_url, library_id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn block_json(id: &str, name: &str, block_type: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "display_name": name,
            "block_type": block_type,
            "has_unpublished_changes": false
        })
    }

    #[tokio::test]
    async fn test_search_blocks_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/lib1/blocks/"))
            .and(query_param("pagination", "true"))
            .and(query_param("page", "2"))
            .and(query_param("page_size", "10"))
            .and(query_param("text_search", "intro"))
            .and(query_param("block_type", "video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [block_json("b1", "Intro Video", "video")],
                "count": 11
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let page = client
            .search_blocks("lib1", "intro", &["video".to_string()], 2, 10)
            .await
            .unwrap();
        assert_eq!(page.count, 11);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, "b1");
    }

    #[tokio::test]
    async fn test_search_blocks_omits_empty_text_search() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/lib1/blocks/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "count": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let page = client.search_blocks("lib1", "", &[], 1, 10).await.unwrap();
        assert_eq!(page.count, 0);

        let received = server.received_requests().await.unwrap();
        assert!(!received[0].url.query().unwrap_or("").contains("text_search"));
    }

    #[tokio::test]
    async fn test_fetch_library_detail() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/lib1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "lib1",
                "title": "Demo Library",
                "allow_lti": true,
                "block_types": [
                    {"block_type": "video", "display_name": "Video"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let library = client.fetch_library_detail("lib1").await.unwrap();
        assert_eq!(library.title, "Demo Library");
        assert!(library.allow_lti);
        assert_eq!(library.block_types.len(), 1);
    }

    #[tokio::test]
    async fn test_create_block_validation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/libraries/v2/lib1/blocks/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "definition_id": "This field may not be blank."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let err = client
            .create_block("lib1", "video", "")
            .await
            .unwrap_err();
        let fields = err.field_errors().expect("expected validation error");
        assert_eq!(
            fields.get("definition_id").map(String::as_str),
            Some("This field may not be blank.")
        );
    }

    #[tokio::test]
    async fn test_delete_block_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/libraries/v2/blocks/missing/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let err = client.delete_block("missing").await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/lib1/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let err = client.fetch_library_detail("lib1").await.unwrap_err();
        match err {
            LibraryError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("Internal"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_maps_to_decode() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/lib1/blocks/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not valid json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let err = client.search_blocks("lib1", "", &[], 1, 10).await.unwrap_err();
        assert!(matches!(err, LibraryError::Decode(_)));
    }

    #[tokio::test]
    async fn test_network_failure_maps_to_network() {
        let client = HttpLibraryClient::new("http://127.0.0.1:1");
        let err = client.fetch_library_detail("lib1").await.unwrap_err();
        assert!(matches!(err, LibraryError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_block_lti_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/libraries/v2/blocks/b1/lti/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lti_url": "/lti/launch/b1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let url = client.fetch_block_lti_url("b1").await.unwrap();
        assert_eq!(url, "/lti/launch/b1");
    }

    #[tokio::test]
    async fn test_fetch_block_view() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/xblock/v2/b1/view/student_view/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "<div>rendered</div>",
                "resources": [{"kind": "url", "data": "/static/x.css"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        let view = client.fetch_block_view("b1", "student_view").await.unwrap();
        assert!(view.content.contains("rendered"));
        assert_eq!(view.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_and_revert() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/libraries/v2/lib1/commit/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/libraries/v2/lib1/commit/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLibraryClient::new(server.uri());
        client.commit_library_changes("lib1").await.unwrap();
        client.revert_library_changes("lib1").await.unwrap();
    }
}
