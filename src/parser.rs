//! Defensive parsing of model output
//!
//! Model text is untrusted: it may be empty, wrapped in prose, or carry
//! doubled braces echoed from the prompt template. `ResponseParser::parse`
//! never fails; the worst case is a `done` record explaining why.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

pub const EMPTY_RESPONSE_REASON: &str = "Empty response";
pub const UNPARSABLE_RESPONSE_REASON: &str = "Could not parse model response";

/// Parsed JSON object returned by the model, with typed accessors
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    fields: Map<String, Value>,
}

impl ModelResponse {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Synthetic `done` record, used whenever no real decision exists
    pub fn done(reasoning: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("action".into(), json!("done"));
        fields.insert("reasoning".into(), Value::String(reasoning.into()));
        Self { fields }
    }

    fn unparsable() -> Self {
        let mut response = Self::done(UNPARSABLE_RESPONSE_REASON);
        response.fields.insert("trade_action".into(), json!("done"));
        response.fields.insert("symbol".into(), json!(""));
        response.fields.insert("quantity".into(), json!(0));
        response
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// THINK routing tag, lower-cased; "done" when absent
    pub fn action(&self) -> String {
        self.str_field("action")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "done".to_string())
    }

    /// DECIDE trade verb, lower-cased; "done" when absent
    pub fn trade_action(&self) -> String {
        self.str_field("trade_action")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "done".to_string())
    }

    pub fn symbol(&self) -> String {
        self.str_field("symbol")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_default()
    }

    /// Accepts a JSON number or a numeric string
    pub fn quantity(&self) -> f64 {
        match self.fields.get("quantity") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.str_field("reasoning")
    }
}

/// Stateless parser for raw model text
pub struct ResponseParser;

impl ResponseParser {
    pub fn parse(raw: &str) -> ModelResponse {
        if raw.trim().is_empty() {
            warn!("Empty response from model");
            return ModelResponse::done(EMPTY_RESPONSE_REASON);
        }

        let cleaned = clean_json_text(raw);

        if let Some(fields) = parse_object(&cleaned) {
            return ModelResponse::from_map(fields);
        }

        if let Some(fields) = first_brace_block(&cleaned).and_then(parse_object) {
            debug!("Recovered JSON object embedded in model prose");
            return ModelResponse::from_map(fields);
        }

        let preview: String = raw.chars().take(500).collect();
        warn!(raw = %preview, "Could not parse JSON from model response");
        ModelResponse::unparsable()
    }
}

/// Trim and collapse template-style doubled braces
fn clean_json_text(text: &str) -> String {
    text.trim().replace("{{", "{").replace("}}", "}")
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}

/// Leftmost `{...}` block whose inner braces nest at most one level.
/// A start brace that runs into deeper nesting is abandoned and the
/// scan moves on to the next `{`.
fn first_brace_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();

    for (start, _) in text.match_indices('{') {
        let mut depth = 1;
        for (offset, &b) in bytes[start + 1..].iter().enumerate() {
            match b {
                b'{' if depth == 1 => depth = 2,
                b'{' => break,
                b'}' if depth == 2 => depth = 1,
                b'}' => {
                    let end = start + 1 + offset;
                    return Some(&text[start..=end]);
                }
                _ => {}
            }
        }
    }

    None
}
