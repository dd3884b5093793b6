//! LibreTranslate backend (hosted or self-hosted)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Translator;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://libretranslate.com";

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    language: String,
}

/// Translates through a LibreTranslate server
pub struct LibreTranslator {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl LibreTranslator {
    /// Create a translator, optionally against a self-hosted server
    #[must_use]
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn post<B: Serialize + Sync, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Translation(format!("LibreTranslate request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LibreTranslate API error");
            return Err(Error::Translation(format!(
                "LibreTranslate error {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            Error::Translation(format!("failed to parse LibreTranslate response: {e}"))
        })
    }
}

#[async_trait]
impl Translator for LibreTranslator {
    async fn detect(&self, text: &str) -> Result<String> {
        let request = DetectRequest {
            q: text,
            api_key: self.api_key.as_deref(),
        };

        let detections: Vec<DetectResponse> = self.post("/detect", &request).await?;
        detections
            .into_iter()
            .next()
            .map(|d| d.language)
            .ok_or_else(|| Error::Translation("LibreTranslate returned no detections".to_string()))
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response: TranslateResponse = self.post("/translate", &request).await?;
        Ok(response.translated_text)
    }

    fn name(&self) -> &'static str {
        "libretranslate"
    }
}
