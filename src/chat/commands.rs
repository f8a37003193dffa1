//! Turns a free-text model reply into the command array the calendar UI
//! consumes.
//!
//! Two stages, in order:
//! 1. the sentinel region (a fenced ```json block, else the span from the
//!    first `[` to the last `]`) must parse as a JSON array;
//! 2. otherwise the whole reply becomes a single `MESSAGE` command.
//!
//! The fallback is the intended result for prose replies, not an error.
//! Array elements are passed through as-is.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```json\s*(.*?)```").unwrap();
}

pub fn message(text: &str) -> Vec<Value> {
    vec![json!({ "command": "MESSAGE", "text": text })]
}

fn sentinel_region(reply: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(reply) {
        return caps.get(1).map(|m| m.as_str().trim());
    }
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    (end > start).then(|| &reply[start..=end])
}

pub fn extract_commands(reply: &str) -> Vec<Value> {
    sentinel_region(reply)
        .and_then(|region| serde_json::from_str::<Vec<Value>>(region).ok())
        .unwrap_or_else(|| message(reply))
}
