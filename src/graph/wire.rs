//! MediaWiki query API response shapes (`formatversion=2`)

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub query: Option<QueryBody>,
    /// Continuation parameters to merge into the next request
    #[serde(rename = "continue", default)]
    pub continuation: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl ApiResponse {
    pub fn continuation_params(&self) -> Option<Vec<(String, String)>> {
        let continuation = self.continuation.as_ref()?;
        if continuation.is_empty() {
            return None;
        }
        Some(
            continuation
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect(),
        )
    }

    pub fn into_query(self) -> QueryBody {
        self.query.unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub pages: Vec<WirePage>,
    #[serde(default)]
    pub backlinks: Vec<TitleEntry>,
    #[serde(default)]
    pub random: Vec<TitleEntry>,
    #[serde(default)]
    pub allpages: Vec<TitleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WirePage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub extract: Option<String>,
    #[serde(default)]
    pub links: Vec<TitleEntry>,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub invalid: bool,
}

impl WirePage {
    pub fn exists(&self) -> bool {
        !self.missing && !self.invalid
    }
}

#[derive(Debug, Deserialize)]
pub struct TitleEntry {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub info: String,
}
