use crate::config::GoogleBooksConfig;
use crate::domain::{BookMetadata, BookSummary};
use crate::error::BarnResult;
use crate::store::SearchApi;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Google Books volumes API.
///
/// Aborting a request is done by dropping its future.
#[derive(Clone)]
pub struct GoogleBooks {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: u32,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Volume {
    id: Option<String>,
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    image_links: Option<ImageLinks>,
    page_count: Option<u32>,
    published_date: Option<String>,
    categories: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl Volume {
    fn into_metadata(self) -> Option<BookMetadata> {
        let book_id = self.id?;
        let info = self.volume_info;
        let thumbnail = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail))
            .unwrap_or_default();

        Some(BookMetadata {
            book_id,
            title: info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_owned()),
            authors: info
                .authors
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| vec![UNKNOWN_AUTHOR.to_owned()]),
            thumbnail,
            page_count: info.page_count.unwrap_or(0),
            published_date: info.published_date.unwrap_or_default(),
            categories: info.categories.unwrap_or_default(),
            description: info.description.unwrap_or_default(),
        })
    }
}

impl VolumesResponse {
    pub(crate) fn into_summaries(self) -> Vec<BookSummary> {
        self.items
            .into_iter()
            .filter_map(Volume::into_metadata)
            .map(|meta| BookSummary::from(&meta))
            .collect()
    }
}

impl GoogleBooks {
    pub fn new(config: &GoogleBooksConfig, max_results: u32) -> Self {
        GoogleBooks {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            max_results,
        }
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }
}

#[async_trait]
impl SearchApi for GoogleBooks {
    async fn search(&self, text: &str) -> BarnResult<Vec<BookSummary>> {
        debug!("google books: searching '{text}'");
        let max_results = self.max_results.to_string();
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("q", text), ("maxResults", max_results.as_str())]);

        let response: VolumesResponse = self
            .with_key(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.into_summaries())
    }

    async fn lookup(&self, book_id: &str) -> BarnResult<Option<BookMetadata>> {
        debug!("google books: looking up {book_id}");
        let request = self.client.get(format!("{}/{}", self.base_url, book_id));
        let response = self.with_key(request).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let volume: Volume = response.error_for_status()?.json().await?;
        Ok(volume.into_metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volumes_fall_back_to_placeholders() {
        let body = r#"{
            "items": [
                {
                    "id": "abc",
                    "volumeInfo": {
                        "title": "Dune",
                        "authors": ["Frank Herbert"],
                        "pageCount": 412,
                        "imageLinks": { "smallThumbnail": "http://img/small" }
                    }
                },
                { "id": "bare" },
                { "volumeInfo": { "title": "no id" } }
            ]
        }"#;

        let response: VolumesResponse = serde_json::from_str(body).unwrap();
        let summaries = response.into_summaries();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].title, "Dune");
        assert_eq!(summaries[0].thumbnail, "http://img/small");
        assert_eq!(summaries[0].page_count, 412);
        assert_eq!(summaries[1].title, UNKNOWN_TITLE);
        assert_eq!(summaries[1].authors, vec![UNKNOWN_AUTHOR.to_owned()]);
        assert_eq!(summaries[1].page_count, 0);
    }

    #[test]
    fn empty_search_has_no_items_key() {
        let response: VolumesResponse = serde_json::from_str(r#"{"totalItems": 0}"#).unwrap();
        assert!(response.into_summaries().is_empty());
    }
}
