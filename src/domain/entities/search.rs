use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// An empty `hits` list marks the end of a scroll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollPage {
    pub scroll_id: Option<String>,
    pub hits: Vec<SearchHit>,
}
