//! LibreTranslate-compatible HTTP translation backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{TranslationError, Translator};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText", default)]
    translated_text: String,
}

/// Client for a remote `/translate` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteTranslator {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl Translator for RemoteTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            source,
            target,
            chars = text.len(),
            "Sending translation request"
        );

        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Remote { status, body });
        }

        let parsed: TranslateResponse = response.json().await?;
        Ok(parsed.translated_text)
    }

    fn describe(&self) -> String {
        format!("remote ({})", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// Starts a mock translation service on a random port.
    /// Returns the base URL, the server handle, and every request body it received.
    fn start_mock_server(
        status: u16,
        body: &'static str,
    ) -> (String, actix_web::dev::ServerHandle, Arc<Mutex<Vec<Value>>>) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = received.clone();

        let server = HttpServer::new(move || {
            let seen = seen.clone();
            App::new().route(
                "/translate",
                web::post().to(move |payload: web::Json<Value>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(payload.into_inner());
                        HttpResponse::build(
                            actix_web::http::StatusCode::from_u16(status).unwrap(),
                        )
                        .content_type("application/json")
                        .body(body)
                    }
                }),
            )
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);
        (base_url, handle, received)
    }

    #[actix_web::test]
    async fn test_translate_returns_translated_text() {
        let (url, handle, received) =
            start_mock_server(200, r#"{"translatedText":"Merhaba dünya"}"#);
        let translator =
            RemoteTranslator::new(&url, Some("secret".into()), Duration::from_secs(5)).unwrap();

        let out = translator.translate("Hello world", "en", "tr").await.unwrap();
        assert_eq!(out, "Merhaba dünya");

        let requests = received.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![json!({
                "q": "Hello world",
                "source": "en",
                "target": "tr",
                "format": "text",
                "api_key": "secret"
            })]
        );
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_missing_translated_text_is_empty() {
        let (url, handle, received) = start_mock_server(200, r#"{"detectedLanguage":"en"}"#);
        let translator = RemoteTranslator::new(&url, None, Duration::from_secs(5)).unwrap();

        let out = translator.translate("Hello", "en", "ar").await.unwrap();
        assert_eq!(out, "");
        assert!(received.lock().unwrap()[0].get("api_key").is_none());
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_error_status_carries_body() {
        let (url, handle, _) = start_mock_server(400, r#"{"error":"fa is not supported"}"#);
        let translator = RemoteTranslator::new(&url, None, Duration::from_secs(5)).unwrap();

        let err = translator.translate("Hello", "en", "fa").await.unwrap_err();
        match err {
            TranslationError::Remote { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("fa is not supported"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_unreachable_service_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let translator = RemoteTranslator::new(&url, None, Duration::from_secs(2)).unwrap();
        let err = translator.translate("Hello", "en", "tr").await.unwrap_err();
        assert!(matches!(err, TranslationError::Http(_)));
    }
}
