//! Webhook message parsing.
//!
//! A message is free text with embedded command blocks:
//!
//! ```text
//! deribit(BTC-PERPETUAL) { limitOrder(side=buy, amount=1, offset=100); }
//! ```
//!
//! Parsing is two nested find-all passes (blocks, then actions inside each
//! block) plus a comma tokenizer for arguments that honors one level of
//! double quotes. Malformed input never errors: blocks, actions and
//! arguments that do not match are silently dropped.
//!
//! Messages containing the `{!}` marker additionally carry an operator
//! alert: everything outside the command blocks, see [`extract_alert`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker that flags the non-block remainder of a message as an alert.
pub const ALERT_MARKER: &str = "{!}";

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([a-z][a-z0-9]*)\(([^()]*)\)\s*\{([^{}]*)\}").expect("block regex")
});

static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([a-z]+)\(([^)]*)\)").expect("action regex"));

static NAMED_ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z][a-z0-9]*)\s*=\s*(.*)$").expect("arg regex"));

/// One `exchange(symbol) { ... }` block of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    pub exchange: String,
    pub symbol: String,
    pub actions: Vec<Action>,
}

/// One `name(args)` action inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub args: Vec<ArgItem>,
}

impl Action {
    /// Render back to the canonical `name(k=v, ...)` form.
    ///
    /// Values containing separators are re-quoted, so parsing the canonical
    /// form yields the same action again.
    pub fn canonical(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|arg| {
                let value = if needs_quotes(&arg.value) {
                    format!("\"{}\"", arg.value)
                } else {
                    arg.value.clone()
                };
                match &arg.name {
                    Some(name) => format!("{name}={value}"),
                    None => value,
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, args)
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.contains(',')
        || value.contains(')')
        || value.contains('=')
        || value.trim() != value
}

/// One argument of an action: positional (`name == None`) or named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgItem {
    pub name: Option<String>,
    pub value: String,
    /// Textual position within the action's argument list.
    pub index: usize,
}

impl ArgItem {
    pub fn positional(value: impl Into<String>, index: usize) -> Self {
        Self { name: None, value: value.into(), index }
    }

    pub fn named(name: impl Into<String>, value: impl Into<String>, index: usize) -> Self {
        Self { name: Some(name.into()), value: value.into(), index }
    }
}

/// Split a raw message into its command blocks.
///
/// Blocks whose exchange, symbol or body is empty are dropped.
pub fn parse_message(message: &str) -> Vec<CommandBlock> {
    BLOCK_RE
        .captures_iter(message)
        .filter_map(|caps| {
            let exchange = caps[1].trim().to_string();
            let symbol = caps[2].trim().to_string();
            let body = caps[3].trim();
            if exchange.is_empty() || symbol.is_empty() || body.is_empty() {
                return None;
            }
            Some(CommandBlock { exchange, symbol, actions: parse_actions(body) })
        })
        .collect()
}

/// Split a block body into its actions.
pub fn parse_actions(body: &str) -> Vec<Action> {
    ACTION_RE
        .captures_iter(body)
        .map(|caps| Action {
            name: caps[1].to_string(),
            args: split_args(&caps[2]),
        })
        .collect()
}

/// Split an action's argument text into items.
///
/// Arguments are comma separated; a single level of double quotes protects
/// commas inside a value. Each item is either `name=value` or a bare value.
pub fn split_args(text: &str) -> Vec<ArgItem> {
    let mut items = Vec::new();
    for token in split_commas(text) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let index = items.len();
        let item = match NAMED_ARG_RE.captures(token) {
            Some(caps) => ArgItem::named(&caps[1], unquote(caps[2].trim()), index),
            None => ArgItem::positional(unquote(token), index),
        };
        items.push(item);
    }
    items
}

/// Split on commas that are not inside double quotes.
fn split_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Extract the operator alert from a message, if it carries one.
///
/// Returns `Some` when the message contains the `{!}` marker: all command
/// blocks and markers are stripped and the remaining whitespace collapsed.
pub fn extract_alert(message: &str) -> Option<String> {
    if !message.contains(ALERT_MARKER) {
        return None;
    }
    let without_blocks = BLOCK_RE.replace_all(message, " ");
    let without_marker = without_blocks.replace(ALERT_MARKER, " ");
    Some(without_marker.split_whitespace().collect::<Vec<_>>().join(" "))
}
