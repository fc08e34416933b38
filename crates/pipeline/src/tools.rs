//! Tool registry and dispatcher for function calls the LLM may invoke.
//!
//! Execution is sequential and never returns `Err` across the dispatch
//! boundary: a failed or unknown call gets a structured error string as
//! its result, which flows back to the model as tool-message content so
//! it can react in conversation.

use std::path::PathBuf;

use serde_json::Value;

use cb_domain::chat::{ToolCall, ToolDescriptor};

pub struct ToolsHandler {
    descriptors: Vec<ToolDescriptor>,
    /// Backing file for `load_context`, when configured.
    context_path: Option<PathBuf>,
}

impl ToolsHandler {
    pub fn new(context_path: Option<PathBuf>) -> Self {
        Self {
            descriptors: descriptors(),
            context_path,
        }
    }

    /// Tool descriptors advertised to the LLM.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.descriptors.clone()
    }

    /// Run every call in order, attaching each result (or error text) to
    /// the call record.
    pub async fn execute(&self, mut calls: Vec<ToolCall>) -> Vec<ToolCall> {
        for call in &mut calls {
            let result = match serde_json::from_str::<Value>(arguments_or_empty(&call.arguments)) {
                Ok(args) => self.dispatch(&call.name, &args).await,
                Err(e) => format!("error: arguments are not valid JSON ({e})"),
            };
            tracing::debug!(tool = %call.name, result_len = result.len(), "tool executed");
            call.result = Some(result);
        }
        calls
    }

    async fn dispatch(&self, name: &str, args: &Value) -> String {
        match name {
            "get_current_weather" => self.get_current_weather(args),
            "get_local_date_time" => self.get_local_date_time(),
            "load_context" => self.load_context(),
            unknown => format!("error: unknown tool \"{unknown}\""),
        }
    }

    fn get_current_weather(&self, args: &Value) -> String {
        let location = args.get("location").and_then(|v| v.as_str());
        match location {
            Some(location) => format!("{location}: 15 deg.C, no wind, no rain."),
            None => "error: missing required argument \"location\"".into(),
        }
    }

    fn get_local_date_time(&self) -> String {
        let now = chrono::Local::now();
        format!(
            "The date is {}, the local time is {}",
            now.format("%Y-%m-%d"),
            now.format("%H:%M:%S")
        )
    }

    fn load_context(&self) -> String {
        let Some(path) = &self.context_path else {
            return "error: no context file configured".into();
        };
        match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => format!("error: context file unreadable ({e})"),
        }
    }
}

/// The model sometimes streams empty arguments for zero-parameter tools.
fn arguments_or_empty(arguments: &str) -> &str {
    if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    }
}

fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "get_current_weather".into(),
            description: "Get the current weather for a location.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g., New York, NY.",
                    },
                    "unit": {
                        "type": "string",
                        "enum": ["Celsius", "Fahrenheit"],
                        "default": "Celsius",
                    },
                },
                "required": ["location"],
            }),
        },
        ToolDescriptor {
            name: "get_local_date_time".into(),
            description: "Call this function when user asks date or time. \
                Call it even it was called right before (because the time have changed). \
                It is 24-hour notation, use it to read the time."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        },
        ToolDescriptor {
            name: "load_context".into(),
            description: "Call this function when user asks to load context.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        },
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
