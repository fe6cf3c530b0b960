//! Shared harness for the integration suites: a stub LLM, a context
//! factory, and helpers to feed wire lines and drain outbound traffic.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use banter::bot::Context;
use banter::error::LlmError;
use banter::llm::{Llm, LlmRequest};
use banter::router;
use banter::Config;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

/// LLM double returning a fixed reply.
pub struct StubLlm(pub &'static str);

#[async_trait]
impl Llm for StubLlm {
    async fn complete(&self, _req: LlmRequest) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

/// Baseline configuration; merge overrides on top per test.
pub fn base_config() -> Value {
    json!({
        "nick": "Quip",
        "altnick": "Quip_",
        "ident": "quip",
        "realname": "Quip Bot",
        "servers": [{"host": "irc.example.net", "port": 6667}],
        "channels": [{"name": "#banter"}]
    })
}

pub fn merged_config(overrides: Value) -> Value {
    let mut config = base_config();
    if let (Some(base), Some(extra)) = (config.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    config
}

/// Build a context around a stub LLM and hand back the outbound queue.
pub fn new_context(
    overrides: Value,
    reply: &'static str,
) -> (Arc<Context>, UnboundedReceiver<String>) {
    let config: Config = serde_json::from_value(merged_config(overrides)).expect("valid config");
    Context::new(config, Arc::new(StubLlm(reply))).expect("context builds")
}

/// Feed wire lines through the router in order.
pub async fn feed(ctx: &Arc<Context>, lines: &[&str]) {
    for line in lines {
        router::handle_line(ctx, line).await;
    }
}

/// Collect everything currently queued for the wire.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(line) = rx.try_recv() {
        out.push(line);
    }
    out
}

/// Let spawned reply tasks run to completion (virtual time).
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
