//! Completion service configuration

/// Credentials and endpoint for the completion service
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Full `generateContent` endpoint URL, without the query string
    pub api_url: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup`; empty values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        Self {
            api_key: first(&["GEMINI_API_KEY", "VITE_GEMINI_API_KEY"]),
            api_url: first(&["GEMINI_API_URL", "VITE_API_URL"]),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.api_key.is_some() && self.api_url.is_some()
    }
}
