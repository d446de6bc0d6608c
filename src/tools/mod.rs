//! Tools exposed to the worker agents and the collaborator traits they
//! delegate to.
//!
//! Tools take and return `serde_json::Value` so the reasoning loop can hand
//! model-produced arguments straight through. Input shapes are deliberately
//! permissive; the model does not always follow the schema it was given.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// A capability invokable from the reasoning loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, input: Value) -> Result<Value>;
}

/// Retrieval backend over one record collection (reviews or businesses).
#[async_trait]
pub trait RecordSearch: Send + Sync {
    /// Top-k records for a free-text query.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Value>>;
    /// Exact lookup by record id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Value>>;
}

/// Sentiment backend; returns the metrics object for a batch of texts.
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, texts: &[String]) -> Result<Value>;
}

const DEFAULT_K: usize = 5;

fn query_and_k(input: &Value) -> (String, usize) {
    match input {
        Value::String(s) => (s.clone(), DEFAULT_K),
        Value::Object(map) => {
            let query = map
                .get("query")
                .or_else(|| map.get("search_term"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let k = map
                .get("k")
                .or_else(|| map.get("max_results"))
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_K);
            (query, k)
        }
        _ => (String::new(), DEFAULT_K),
    }
}

/// Semantic search over the review collection, with an optional post-filter
/// on `business_id`.
pub struct ReviewSearchTool {
    reviews: Arc<dyn RecordSearch>,
}

impl ReviewSearchTool {
    pub fn new(reviews: Arc<dyn RecordSearch>) -> Self {
        ReviewSearchTool { reviews }
    }
}

#[async_trait]
impl Tool for ReviewSearchTool {
    fn name(&self) -> &str {
        "search_reviews"
    }

    fn description(&self) -> &str {
        "Search customer reviews by topic or sentiment. Input: a query string, \
         or an object {\"query\": str, \"k\": int, \"business_id\": str}."
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let (query, k) = query_and_k(&input);
        let business_id = input
            .get("business_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut reviews = self.reviews.search(&query, k).await?;
        if let Some(id) = &business_id {
            reviews.retain(|r| r.get("business_id").and_then(Value::as_str) == Some(id));
        }

        Ok(json!({
            "tool": "review_search",
            "query": query,
            "results_count": reviews.len(),
            "reviews": reviews,
        }))
    }
}

/// Semantic search over the business collection.
pub struct BusinessSearchTool {
    businesses: Arc<dyn RecordSearch>,
}

impl BusinessSearchTool {
    pub fn new(businesses: Arc<dyn RecordSearch>) -> Self {
        BusinessSearchTool { businesses }
    }
}

#[async_trait]
impl Tool for BusinessSearchTool {
    fn name(&self) -> &str {
        "search_businesses"
    }

    fn description(&self) -> &str {
        "Search businesses by name, category or location. Input: a query \
         string, or an object {\"query\": str, \"k\": int}."
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let (query, k) = query_and_k(&input);
        let businesses = self.businesses.search(&query, k).await?;
        Ok(json!({
            "tool": "business_search",
            "search_term": query,
            "results_count": businesses.len(),
            "businesses": businesses,
        }))
    }
}

/// Exact business lookup by id.
pub struct BusinessInfoTool {
    businesses: Arc<dyn RecordSearch>,
}

impl BusinessInfoTool {
    pub fn new(businesses: Arc<dyn RecordSearch>) -> Self {
        BusinessInfoTool { businesses }
    }
}

#[async_trait]
impl Tool for BusinessInfoTool {
    fn name(&self) -> &str {
        "get_business_info"
    }

    fn description(&self) -> &str {
        "Fetch one business record by id. Input: a business_id string, or an \
         object {\"business_id\": str}."
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let id = match &input {
            Value::String(s) => s.clone(),
            other => other
                .get("business_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        match self.businesses.get_by_id(&id).await? {
            Some(business) => Ok(json!({
                "tool": "business_info",
                "business_id": id,
                "business": business,
            })),
            None => Ok(json!({
                "tool": "business_info",
                "business_id": id,
                "error": format!("No business found with id '{}'", id),
            })),
        }
    }
}

/// Sentiment metrics over a batch of review texts. When the model passes no
/// usable texts the tool falls back to the review texts captured from the
/// shared state at construction time.
pub struct SentimentTool {
    analyzer: Arc<dyn SentimentAnalyzer>,
    default_texts: Vec<String>,
}

impl SentimentTool {
    pub fn new(analyzer: Arc<dyn SentimentAnalyzer>, default_texts: Vec<String>) -> Self {
        SentimentTool {
            analyzer,
            default_texts,
        }
    }

    /// Accepts an array of strings, an array of review objects carrying a
    /// `text` field, an object with a `reviews` array, or a single string.
    fn coerce_texts(&self, input: &Value) -> Vec<String> {
        fn from_array(items: &[Value]) -> Vec<String> {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => {
                        map.get("text").and_then(Value::as_str).map(str::to_string)
                    }
                    _ => None,
                })
                .collect()
        }

        let texts = match input {
            Value::Array(items) => from_array(items),
            Value::Object(map) => match map.get("reviews").or_else(|| map.get("texts")) {
                Some(Value::Array(items)) => from_array(items),
                _ => Vec::new(),
            },
            Value::String(s) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        };

        if texts.is_empty() {
            self.default_texts.clone()
        } else {
            texts
        }
    }
}

#[async_trait]
impl Tool for SentimentTool {
    fn name(&self) -> &str {
        "analyze_sentiment"
    }

    fn description(&self) -> &str {
        "Compute sentiment metrics over review texts. Input: an array of \
         strings, an object {\"reviews\": [...]}, or empty to analyze the \
         reviews already collected."
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let texts = self.coerce_texts(&input);
        let analysis = self.analyzer.analyze(&texts).await?;
        Ok(json!({
            "tool": "sentiment_analysis",
            "texts_analyzed": texts.len(),
            "analysis": analysis,
        }))
    }
}
