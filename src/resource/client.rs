use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::{Error, Result};

use super::{Id, Item, ResourceClient, DEFAULT_ID_FIELD};

/// REST client for one collection endpoint.
///
/// `GET base[/id]`, `POST base`, `PUT base/id` and `DELETE base/id`.
/// No caching and no retries.
#[derive(Clone, Debug)]
pub struct RestClient {
  http: reqwest::Client,
  base_url: String,
  id_field: String,
}

impl RestClient {
  pub fn new(base_url: &str) -> Result<Self> {
    Self::with_http_client(reqwest::Client::new(), base_url)
  }

  /// Build on an existing HTTP client (shared pool, custom headers).
  pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Result<Self> {
    url::Url::parse(base_url).map_err(|source| Error::InvalidUrl {
      url: base_url.to_string(),
      source,
    })?;

    let base_url = base_url.strip_suffix('/').unwrap_or(base_url).to_string();

    Ok(Self {
      http,
      base_url,
      id_field: DEFAULT_ID_FIELD.to_string(),
    })
  }

  pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
    self.id_field = field.into();
    self
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn item_url(&self, id: &Id) -> String {
    format!("{}/{}", self.base_url, id)
  }

  /// Send a request and turn non-2xx statuses into errors.
  async fn send(
    &self,
    method: Method,
    url: String,
    build: impl FnOnce(RequestBuilder) -> RequestBuilder,
  ) -> Result<Response> {
    debug!(%method, %url, "sending request");

    let response = build(self.http.request(method.clone(), &url)).send().await?;

    let status = response.status();
    if !status.is_success() {
      return Err(Error::Status {
        method: method_name(&method),
        url,
        status,
      });
    }

    Ok(response)
  }
}

fn method_name(method: &Method) -> &'static str {
  match *method {
    Method::GET => "GET",
    Method::POST => "POST",
    Method::PUT => "PUT",
    Method::DELETE => "DELETE",
    _ => "REQUEST",
  }
}

#[async_trait]
impl ResourceClient for RestClient {
  async fn list(&self) -> Result<Vec<Item>> {
    let response = self
      .send(Method::GET, self.base_url.clone(), |r| r)
      .await?;
    Ok(response.json().await?)
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    let response = match self.send(Method::GET, self.item_url(id), |r| r).await {
      Err(Error::Status { status, .. }) if status == StatusCode::NOT_FOUND => return Ok(None),
      result => result?,
    };
    Ok(Some(response.json().await?))
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    let response = self
      .send(Method::POST, self.base_url.clone(), |r| r.json(item))
      .await?;
    Ok(response.json().await?)
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    let id = Id::of(item, &self.id_field).ok_or_else(|| {
      Error::Argument(format!("put requires \"{}\" to be set", self.id_field))
    })?;

    let response = self
      .send(Method::PUT, self.item_url(&id), |r| r.json(item))
      .await?;
    Ok(response.json().await?)
  }

  async fn del(&self, id: &Id) -> Result<()> {
    let response = self.send(Method::DELETE, self.item_url(id), |r| r).await?;
    // Plain-text body, content is not interpreted
    let _ = response.text().await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_trailing_slash_is_trimmed_once() {
    let client = RestClient::new("http://localhost:8080/todos/").unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080/todos");
    assert_eq!(client.item_url(&Id::Num(3)), "http://localhost:8080/todos/3");

    let client = RestClient::new("http://localhost:8080/todos").unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080/todos");
  }

  #[test]
  fn test_invalid_url_is_rejected() {
    let err = RestClient::new("not a url").unwrap_err();
    assert!(matches!(err, Error::InvalidUrl { .. }));
  }

  #[tokio::test]
  async fn test_put_without_id_fails_before_sending() {
    // Port 9 (discard) is never contacted: the id check runs first
    let client = RestClient::new("http://127.0.0.1:9/todos").unwrap();
    let item = json!({"title": "x"}).as_object().cloned().unwrap();

    let err = client.put(&item).await.unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
  }

  /// Answer one connection with `status_line` and an empty JSON body.
  async fn serve_once(status_line: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 4096];
      let _ = socket.read(&mut buf).await;
      let response = format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{{}}",
        status_line
      );
      let _ = socket.write_all(response.as_bytes()).await;
    });
    format!("http://{}/todos", addr)
  }

  #[tokio::test]
  async fn test_get_unknown_id_is_none() {
    let client = RestClient::new(&serve_once("404 Not Found").await).unwrap();
    assert_eq!(client.get(&Id::Num(42)).await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_get_server_error_is_status() {
    let client = RestClient::new(&serve_once("500 Internal Server Error").await).unwrap();
    let err = client.get(&Id::Num(1)).await.unwrap_err();
    assert!(matches!(err, Error::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
  }

  #[tokio::test]
  async fn test_unreachable_server_is_transport_error() {
    let client = RestClient::new("http://127.0.0.1:9/todos").unwrap();
    let err = client.list().await.unwrap_err();
    assert!(err.is_transport());
  }
}
