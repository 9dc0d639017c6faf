use crate::catalog::{CatalogItem, CollectionsPage, SearchPage};
use crate::error::SyncError;
use futures_util::stream::{self, LocalBoxStream, StreamExt, TryStreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Read-only access to a catalogue. An empty `collection_ids` slice means no filter.
pub trait Catalog {
    /// Number of items the server says match; servers may report 0 or omit it.
    async fn count(&self, collection_ids: &[String]) -> Result<u64, SyncError>;

    /// Lazily walks every page of matching items. Call again to restart.
    fn search<'a>(
        &'a self,
        collection_ids: &'a [String],
    ) -> LocalBoxStream<'a, Result<CatalogItem, SyncError>>;

    /// `"{id} {title}"` for every collection the token can see.
    async fn list_collections(&self) -> Result<Vec<String>, SyncError>;

    /// Forget any stored results for `collection_ids` so the next search hits the server.
    async fn invalidate(&self, _collection_ids: &[String]) -> Result<(), SyncError> {
        Ok(())
    }
}

pub struct SearchClient {
    client: Client,
    auth_token: String,
    base_url: String,
}

impl SearchClient {
    pub fn new(client: Client, auth_token: &str, base_url: &str) -> Self {
        Self {
            client,
            auth_token: auth_token.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self, collection_ids: &[String], limit: Option<u32>) -> String {
        let mut params = vec![];
        if let Some(limit) = limit {
            params.push(format!("limit={limit}"));
        }
        if !collection_ids.is_empty() {
            params.push(format!("collections={}", collection_ids.join(",")));
        }

        let url = format!("{}/search", self.base_url);
        if params.is_empty() {
            url
        } else {
            format!("{}?{}", url, params.join("&"))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        debug!(url, "Requesting catalogue page");
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Token {}", self.auth_token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| SyncError::Network {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|source| SyncError::Network {
            url: url.to_owned(),
            source,
        })
    }
}

impl Catalog for SearchClient {
    async fn count(&self, collection_ids: &[String]) -> Result<u64, SyncError> {
        let url = self.search_url(collection_ids, Some(0));
        let page: SearchPage = self.get_json(&url).await?;
        Ok(page.number_matched.unwrap_or(0))
    }

    fn search<'a>(
        &'a self,
        collection_ids: &'a [String],
    ) -> LocalBoxStream<'a, Result<CatalogItem, SyncError>> {
        let first_page = self.search_url(collection_ids, None);

        stream::try_unfold(Some(first_page), move |next_page| async move {
            let Some(url) = next_page else {
                return Ok(None);
            };
            let page: SearchPage = self.get_json(&url).await?;
            let next_page = page.next_link().map(str::to_owned);
            debug!(items = page.features.len(), has_next = next_page.is_some(), "Received search page");
            Ok::<_, SyncError>(Some((page.features, next_page)))
        })
        .map_ok(|features| stream::iter(features.into_iter().map(Ok::<_, SyncError>)))
        .try_flatten()
        .boxed_local()
    }

    async fn list_collections(&self) -> Result<Vec<String>, SyncError> {
        let url = format!("{}/collections", self.base_url);
        let page: CollectionsPage = self.get_json(&url).await?;
        Ok(page.collections.iter().map(|c| c.describe()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "collection": "1",
            "links": [{"rel": "collection", "href": "https://fake.io/collections/1", "title": "Collection 1"}],
            "assets": {}
        })
    }

    fn client(server: &MockServer) -> SearchClient {
        SearchClient::new(Client::new(), "foobar", &format!("{}/", server.uri()))
    }

    #[test]
    fn test_search_url() {
        let client = SearchClient::new(Client::new(), "t", "http://www.example.com/catalogue_1");
        assert_eq!(
            client.search_url(&[], None),
            "http://www.example.com/catalogue_1/search"
        );
        assert_eq!(
            client.search_url(&["1".to_string(), "2".to_string()], None),
            "http://www.example.com/catalogue_1/search?collections=1,2"
        );
        assert_eq!(
            client.search_url(&["1".to_string()], Some(0)),
            "http://www.example.com/catalogue_1/search?limit=0&collections=1"
        );
    }

    #[tokio::test]
    async fn test_search_follows_next_links() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("Authorization", "Token foobar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [item("a"), item("b")],
                "links": [{"rel": "next", "href": format!("{}/search/page2", server.uri())}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search/page2"))
            .and(header("Authorization", "Token foobar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [item("c")],
                "links": [{"rel": "self", "href": format!("{}/search/page2", server.uri())}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let items: Vec<CatalogItem> = client.search(&[]).try_collect().await.unwrap();
        let ids: Vec<&str> = items.iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_search_with_collection_filters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("collections", "1,2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"features": [item("a")], "links": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let ids = vec!["1".to_string(), "2".to_string()];
        let items: Vec<CatalogItem> = client.search(&ids).try_collect().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_search_is_lazy() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [item("a")],
                "links": [{"rel": "next", "href": format!("{}/search/page2", server.uri())}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server);
        let mut items = client.search(&[]);
        let first = items.try_next().await.unwrap().unwrap();
        assert_eq!(first.id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_search_error_status_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client(&server);
        let result: Result<Vec<CatalogItem>, SyncError> = client.search(&[]).try_collect().await;
        assert!(matches!(result, Err(SyncError::HttpStatus { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_count_reads_number_matched() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("limit", "0"))
            .and(query_param("collections", "1"))
            .and(header("Authorization", "Token foobar"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"features": [], "numberMatched": 42})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("limit", "0"))
            .and(query_param_is_missing("collections"))
            .and(header("Authorization", "Token foobar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.count(&["1".to_string()]).await.unwrap(), 42);
        assert_eq!(client.count(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_collections() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/collections"))
            .and(header("Authorization", "Token foobar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "links": [],
                "collections": [{"id": "1", "title": "Collection1", "type": "Collection"}]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.list_collections().await.unwrap(), vec!["1 Collection1"]);
    }
}
