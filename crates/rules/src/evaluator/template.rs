//! Finding message rendering with minijinja.
//!
//! Messages are authored as templates over `invoice.*`, `item.*` and
//! `rule.*`. Rendering never fails a rule: undefined or empty values render
//! as empty strings, and a template that cannot be rendered at all falls
//! back to its raw text.

use minijinja::value::Value;
use minijinja::{Environment, UndefinedBehavior};

/// Renders finding messages. One environment is shared across renders.
#[derive(Debug)]
pub struct MessageRenderer {
    env: Environment<'static>,
}

impl MessageRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("money", money_filter);
        env.add_filter("round", round_filter);
        Self { env }
    }

    /// Render `template` against `ctx`. Top-level `null` members of each
    /// context object are dropped so they render as empty.
    pub fn render(&self, template: &str, ctx: &serde_json::Value) -> String {
        let ctx = strip_nulls(ctx);
        match self.env.render_str(template, &ctx) {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, "message template failed to render, using raw text");
                template.to_string()
            }
        }
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Syntax check without rendering. Returns the parser's complaint, if any.
pub fn template_syntax_error(template: &str) -> Option<String> {
    let env = Environment::new();
    env.template_from_str(template).err().map(|e| e.to_string())
}

fn strip_nulls(ctx: &serde_json::Value) -> serde_json::Value {
    match ctx {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Two decimal places with a comma separator, as amounts are shown on NF-e.
fn money_filter(value: Value) -> String {
    match f64::try_from(value) {
        Ok(n) => format!("{n:.2}").replace('.', ","),
        Err(_) => String::new(),
    }
}

/// Upper bound for `round(n)`; larger precisions are clamped.
const MAX_ROUND_DECIMALS: u32 = 10;

fn round_filter(value: Value, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0).min(MAX_ROUND_DECIMALS) as usize;
    match f64::try_from(value) {
        Ok(v) => format!("{v:.n$}"),
        Err(_) => String::new(),
    }
}
