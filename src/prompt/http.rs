//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use serde::Deserialize;

use super::{GenerationService, Prompt, ServiceError};
use crate::config::LlmOptions;

const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

/// Blocking HTTP generation service. Each call blocks only the calling
/// project's build thread.
pub struct HttpGenerationService {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl HttpGenerationService {
    pub fn new(options: &LlmOptions) -> Result<Self, ServiceError> {
        if options.api_key.is_empty() {
            return Err(ServiceError::Unavailable("no API key configured".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let model = if options.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            options.model.clone()
        };
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", options.api_url.trim_end_matches('/')),
            api_key: options.api_key.clone(),
            model,
            timeout_secs: options.timeout_secs,
        })
    }

    fn transport(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout_secs)
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl GenerationService for HttpGenerationService {
    fn generate(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": &prompt.system},
                {"role": "user", "content": &prompt.user}
            ],
            "temperature": 0.0
        });

        tracing::info!(prompt = %prompt.id, model = %self.model, "requesting generation");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().map_err(|e| self.transport(e))?;
        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("no choices returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_unavailable() {
        let options = LlmOptions::default();
        assert!(matches!(
            HttpGenerationService::new(&options),
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let options = LlmOptions {
            api_key: "sk-test".to_string(),
            api_url: "http://localhost:8000/v1/".to_string(),
            ..LlmOptions::default()
        };
        let service = HttpGenerationService::new(&options).unwrap();
        assert_eq!(service.endpoint, "http://localhost:8000/v1/chat/completions");
        assert_eq!(service.model, DEFAULT_MODEL);
    }
}
