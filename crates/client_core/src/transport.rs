//! HTTP binding of [`RemoteCollection`](crate::RemoteCollection).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::{Map, Value};
use shared::{
    domain::{Record, RecordId},
    error::ApiError,
    protocol::Acknowledgement,
    schema::ResourceSchema,
};
use tracing::debug;
use url::Url;

use crate::RemoteCollection;

/// REST resource laid out as `GET /{collection}`, `POST /{item}`,
/// `PUT /{item}/{id}` and `DELETE /{item}/{id}`.
pub struct HttpRemoteCollection {
    http: Client,
    base_url: Url,
    schema: ResourceSchema,
}

impl HttpRemoteCollection {
    pub fn new(base_url: &str, schema: ResourceSchema) -> Result<Self> {
        Self::with_client(Client::new(), base_url, schema)
    }

    pub fn with_client(http: Client, base_url: &str, schema: ResourceSchema) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid base url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("base url '{base_url}' cannot carry a path"));
        }
        Ok(Self {
            http,
            base_url,
            schema,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn collection_url(&self) -> Url {
        self.endpoint(&[self.schema.collection.as_str()])
    }

    pub fn item_url(&self, id: Option<&RecordId>) -> Url {
        match id {
            Some(id) => self.endpoint(&[self.schema.item.as_str(), id.to_string().as_str()]),
            None => self.endpoint(&[self.schema.item.as_str()]),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // checked in the constructor
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Response> {
        debug!(%method, %url, "remote request");
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::Error::new(ApiError::from_body(status.as_u16(), &body))
                .context(format!("{method} {url}")));
        }
        Ok(response)
    }
}

/// Reads a response body that may be JSON, plain text, or empty.
async fn lenient_json(response: Response) -> Result<Value> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait]
impl RemoteCollection for HttpRemoteCollection {
    async fn list(&self) -> Result<Vec<Record>> {
        let url = self.collection_url();
        let records = self
            .send(Method::GET, url.clone(), None)
            .await?
            .json::<Vec<Record>>()
            .await
            .with_context(|| format!("decode record list from {url}"))?;
        Ok(records)
    }

    async fn create(&self, body: &Map<String, Value>) -> Result<Value> {
        let body = Value::Object(body.clone());
        let response = self
            .send(Method::POST, self.item_url(None), Some(&body))
            .await?;
        lenient_json(response).await
    }

    async fn update(&self, id: &RecordId, record: &Record) -> Result<Acknowledgement> {
        let body = serde_json::to_value(record)?;
        let response = self
            .send(Method::PUT, self.item_url(Some(id)), Some(&body))
            .await?;
        Ok(Acknowledgement::from_value(&lenient_json(response).await?))
    }

    async fn delete(&self, id: &RecordId) -> Result<Acknowledgement> {
        let response = self
            .send(Method::DELETE, self.item_url(Some(id)), None)
            .await?;
        Ok(Acknowledgement::from_value(&lenient_json(response).await?))
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
