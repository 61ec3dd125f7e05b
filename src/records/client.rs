use super::{RecordService, UpdateMode};
use crate::models::Collection;
use crate::response::error_from_response;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the portfolio REST API. Collections live at
/// `<base>/<collection>/`, single records at `<base>/<collection>/<id>/`.
pub struct RecordClient {
    client: Client,
    base_url: String,
}

impl RecordClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(base_url, client))
    }

    pub fn new_with_client(base_url: String, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}/", self.base_url, collection.path())
    }

    fn record_url(&self, collection: Collection, id: u64) -> String {
        format!("{}/{}/{}/", self.base_url, collection.path(), id)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send {} request to record store: {}", what, e);
            Error::Request {
                status: None,
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let err = error_from_response(response).await;
            tracing::error!("Record store {} failed (status {}): {}", what, status, err);
            return Err(err);
        }

        Ok(response)
    }

    async fn json(response: Response) -> Result<Value> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse record store response: {}\nBody: {}", e, body);
            Error::Request {
                status: None,
                message: format!("Unexpected record store response: {}", e),
            }
        })
    }
}

#[async_trait]
impl RecordService for RecordClient {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        let request = self.client.get(self.collection_url(collection));
        let response = self.send(request, "list").await?;

        // Paginated endpoints wrap the page in `results`.
        match Self::json(response).await? {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(Error::Request {
                    status: None,
                    message: format!("Expected a list of {}", collection),
                }),
            },
            other => Err(Error::Request {
                status: None,
                message: format!("Expected a list of {}, got {}", collection, other),
            }),
        }
    }

    async fn get(&self, collection: Collection, id: u64) -> Result<Value> {
        let request = self.client.get(self.record_url(collection, id));
        let response = self.send(request, "get").await?;
        Self::json(response).await
    }

    async fn create(&self, collection: Collection, body: &Value) -> Result<Value> {
        let request = self.client.post(self.collection_url(collection)).json(body);
        let response = self.send(request, "create").await?;
        Self::json(response).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: u64,
        body: &Value,
        mode: UpdateMode,
    ) -> Result<Value> {
        let method = match mode {
            UpdateMode::Patch => Method::PATCH,
            UpdateMode::Put => Method::PUT,
        };
        let request = self
            .client
            .request(method, self.record_url(collection, id))
            .json(body);
        let response = self.send(request, "update").await?;
        Self::json(response).await
    }

    async fn delete(&self, collection: Collection, id: u64) -> Result<()> {
        let request = self.client.delete(self.record_url(collection, id));
        self.send(request, "delete").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer) -> RecordClient {
        RecordClient::new(format!("{}/api/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_plain_and_paginated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/skills/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "nombre": "Rust", "categoria": "Backend"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/proyectos/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "results": [{"id": 7, "titulo": "X"}]
            })))
            .mount(&server)
            .await;

        let client = make_client(&server);
        let skills = client.list(Collection::Skills).await.unwrap();
        let projects = client.list(Collection::Projects).await.unwrap();

        assert_eq!(skills[0]["nombre"], "Rust");
        assert_eq!(projects[0]["id"], 7);
    }

    #[tokio::test]
    async fn test_create_posts_body() {
        let server = MockServer::start().await;
        let body = json!({"plataforma": "GitHub", "enlace": "https://github.com/me"});

        Mock::given(method("POST"))
            .and(path("/api/redes-sociales/"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 3,
                "plataforma": "GitHub",
                "enlace": "https://github.com/me"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = make_client(&server)
            .create(Collection::SocialLinks, &body)
            .await
            .unwrap();
        assert_eq!(created["id"], 3);
    }

    #[tokio::test]
    async fn test_patch_and_put_use_record_url() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/proyectos/7/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 7, "imagen": "p.png"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/proyectos/7/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let patched = client
            .update(
                Collection::Projects,
                7,
                &json!({"imagen": "p.png"}),
                UpdateMode::Patch,
            )
            .await
            .unwrap();
        assert_eq!(patched["imagen"], "p.png");

        client
            .update(Collection::Projects, 7, &json!({"titulo": "T"}), UpdateMode::Put)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_field_errors_become_validation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/certificados/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "fecha": ["Date has wrong format. Use one of these formats instead: YYYY-MM-DD."]
            })))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .create(Collection::Certificates, &json!({"fecha": "bad"}))
            .await
            .unwrap_err();

        match err {
            Error::Validation(errors) => assert!(errors["fecha"][0].contains("wrong format")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_not_found_and_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/skills/1/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/skills/2/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
            .mount(&server)
            .await;

        let client = make_client(&server);
        client.delete(Collection::Skills, 1).await.unwrap();
        let err = client.delete(Collection::Skills, 2).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_html_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/experiencias/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<h1>Server Error (500)</h1>"))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .list(Collection::Experience)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request { status: Some(500), .. }));
    }
}
