use anyhow::Result;
use dotenvy::dotenv;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: usize,
    pub openai_key: String,
    pub openai_base_url: Option<String>,
    pub model: String,
    pub llm_timeout_secs: u64,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let openai_key = std::env::var("OPENAI_API_KEY")
            .map_err(|e| anyhow::anyhow!("Failed to load OPENAI_API_KEY: {}", e))?;

        // Optional overrides for OpenAI-compatible providers (e.g. DashScope)
        let openai_base_url = std::env::var("LLM_BASE_URL").ok();
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Config {
            max_file_size: default_max_file_size(),
            openai_key,
            openai_base_url,
            model,
            llm_timeout_secs,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            max_file_size: default_max_file_size(),
            openai_key: "test-key".to_string(),
            openai_base_url: None,
            model: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 30,
        }
    }
}
