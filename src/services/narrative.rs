use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, Role,
    },
    Client,
};
use std::time::Duration;

use crate::config::Config;
use crate::error::AppError;
use crate::services::summarizer::TableSummary;

const REPORT_TEMPERATURE: f32 = 0.5;

/// Turns a table summary into a short prose report through one chat
/// completion. No retries and no caching; each upload pays for its own call.
pub struct NarrativeAgent {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl NarrativeAgent {
    pub fn new(config: &Config) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_key);
        if let Some(base_url) = &config.openai_base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    pub async fn generate_report(&self, summary: &TableSummary) -> Result<String, AppError> {
        let summary_json = serde_json::to_string_pretty(summary)
            .map_err(|e| AppError::Internal(format!("Failed to serialize summary: {}", e)))?;

        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(build_prompt(&summary_json)),
                name: None,
                role: Role::User,
            },
        )];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(REPORT_TEMPERATURE),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                AppError::LlmError(format!(
                    "Report generation timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let report = content.trim().to_string();
        if report.is_empty() {
            return Err(AppError::LlmError(
                "Report generation returned no content".to_string(),
            ));
        }

        Ok(report)
    }
}

fn build_prompt(summary_json: &str) -> String {
    format!(
        "Based on the following CSV summary statistics, write a short data analysis \
         report of 3 to 5 sentences. Describe the size of the dataset, notable \
         distributions of the numeric columns, and the variety of the categorical \
         columns, in plain language for a non-technical reader.\n\
         Statistics:\n{}",
        summary_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::summarizer::summarize;
    use polars::prelude::*;

    #[test]
    fn prompt_embeds_the_serialized_summary() {
        let df = DataFrame::new(vec![Series::new("age", &[31.0f64, 28.0])]).unwrap();
        let summary = summarize(&df).unwrap();
        let json = serde_json::to_string_pretty(&summary).unwrap();

        let prompt = build_prompt(&json);
        assert!(prompt.contains("3 to 5 sentences"));
        assert!(prompt.contains("\"rows\": 2"));
        assert!(prompt.contains("age"));
    }

    #[test]
    fn agent_carries_configured_model_and_timeout() {
        let mut config = Config::for_tests();
        config.model = "qwen-plus".to_string();
        config.llm_timeout_secs = 5;

        let agent = NarrativeAgent::new(&config);
        assert_eq!(agent.model, "qwen-plus");
        assert_eq!(agent.timeout, Duration::from_secs(5));
    }
}
