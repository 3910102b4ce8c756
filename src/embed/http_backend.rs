//! HTTP embedding sidecar backend

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct EmbedTextRequest {
    model: String,
    inputs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingData> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Vectors { vectors } => vectors,
            EmbeddingResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

/// Embedder that posts text batches to an embedding sidecar
pub struct HttpEmbedder {
    client: Client,
    base_url: Url,
    model_id: String,
    dimension: Option<usize>,
    retries: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = Url::parse(&config.backend_url)?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url,
            model_id: config.model.clone(),
            dimension: config.dimension,
            retries: 2,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))
    }

    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::Embedding("Failed to clone backend request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<T>().await?),
                    Err(e) => last_err = Some(Error::Embedding(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Embedding(e.to_string())),
            }

            if attempt < self.retries {
                warn!(attempt = attempt + 1, "Embedding backend request failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Embedding("Embedding backend request failed".to_string())
        }))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("/v1/embed/text")?;
        let request = EmbedTextRequest {
            model: self.model_id.clone(),
            inputs: texts,
        };
        let parsed: EmbeddingResponse = self
            .send_with_retry(self.client.post(url).json(&request))
            .await?;
        Ok(parsed.into_embeddings())
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: "http".to_string(),
            backend_url: server.uri(),
            model: "test-model".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_embed_parses_response_shapes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed/text"))
            .and(body_partial_json(serde_json::json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0, 0.0]}, {"embedding": [0.0, 1.0]}]
            })))
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&mock_server)).unwrap();
        let vectors = embedder
            .embed(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.model_name(), "test-model");
    }

    #[tokio::test]
    async fn test_embed_retries_then_fails() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embed/text"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let embedder = HttpEmbedder::new(&config_for(&mock_server)).unwrap();
        let err = embedder.embed(vec!["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
