//! Argument normalization shared by every command.
//!
//! Merges the parser's positional/named items with a command's declared
//! defaults, then runs a fixed pass order: side, trigger, background,
//! position, offset price, amount. Each pass only fires when the keys it
//! needs are declared by the command.

use std::collections::BTreeMap;

use model::{OffsetSpec, Side, Trigger};
use parser::ArgItem;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::exchange::Exchange;

/// One declared argument of a command, in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub default: &'static str,
}

impl ArgSpec {
    pub const fn new(name: &'static str, default: &'static str) -> Self {
        Self { name, default }
    }
}

/// The normalized view of a command's arguments.
#[derive(Debug, Clone, Default)]
pub struct NormalizedArgs {
    values: BTreeMap<String, String>,
    pub side: Option<Side>,
    pub opposite_side: Option<Side>,
    pub trigger: Option<Trigger>,
    pub background: bool,
    /// Parsed offset, kept for commands that resolve it again (e.g. against
    /// the opposite side).
    pub offset: Option<OffsetSpec>,
    /// Side-aware absolute price resolved from the offset.
    pub order_price: Option<Decimal>,
    /// Amount after position and balance adjustment.
    pub amount: Option<Decimal>,
    /// Amount as requested, before balance clamping.
    pub original_amount: Option<Decimal>,
    /// Market-order "close everything" flag derived from the position spec.
    pub is_everything: bool,
}

impl NormalizedArgs {
    /// Raw string value of an argument.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Raw value, treating an absent or empty string as `None`.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// The user-supplied tag, empty when none was given.
    pub fn tag(&self) -> &str {
        self.get("tag").unwrap_or("")
    }

    /// Decimal value of an argument.
    pub fn decimal(&self, name: &str) -> Result<Option<Decimal>, EngineError> {
        match self.get_non_empty(name) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| EngineError::invalid(format!("argument '{name}' is not a number: '{v}'"))),
        }
    }

    /// Boolean value using the same coercion as `background`: the literal
    /// string "true" (case-insensitive) is true, everything else false.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn side(&self) -> Result<Side, EngineError> {
        self.side.ok_or_else(|| EngineError::invalid("missing side"))
    }

    pub fn opposite_side(&self) -> Result<Side, EngineError> {
        self.opposite_side.ok_or_else(|| EngineError::invalid("missing side"))
    }

    pub fn order_price(&self) -> Result<Decimal, EngineError> {
        self.order_price.ok_or_else(|| EngineError::invalid("missing offset"))
    }

    /// The adjusted amount; zero-size has already failed normalization, so
    /// a present amount is positive.
    pub fn amount(&self) -> Result<Decimal, EngineError> {
        self.amount.ok_or_else(|| EngineError::invalid("missing amount"))
    }

    fn set_value(&mut self, name: &str, value: String) {
        self.values.insert(name.to_string(), value);
    }
}

/// Merge passed items with defaults and run the normalization passes.
pub async fn normalize(
    exchange: &Exchange,
    symbol: &str,
    defaults: &[ArgSpec],
    items: &[ArgItem],
) -> Result<NormalizedArgs, EngineError> {
    let mut args = NormalizedArgs::default();
    merge(&mut args, defaults, items);

    validate_side(&mut args)?;
    validate_trigger(&mut args);
    validate_background(&mut args);
    calculate_position(exchange, symbol, &mut args).await?;
    offset_to_price(exchange, symbol, &mut args).await?;
    calculate_amount(exchange, symbol, &mut args).await?;

    Ok(args)
}

/// Bind positional items to defaults in declaration order, then apply named
/// overrides. Unknown names are discarded.
fn merge(args: &mut NormalizedArgs, defaults: &[ArgSpec], items: &[ArgItem]) {
    for spec in defaults {
        args.set_value(spec.name, spec.default.to_string());
    }

    let mut sorted: Vec<&ArgItem> = items.iter().collect();
    sorted.sort_by_key(|item| item.index);

    let mut slot = 0usize;
    for item in &sorted {
        if item.name.is_none() {
            if let Some(spec) = defaults.get(slot) {
                args.set_value(spec.name, item.value.clone());
            } else {
                debug!(value = %item.value, "extra positional argument discarded");
            }
            slot += 1;
        }
    }
    for item in &sorted {
        if let Some(name) = &item.name {
            match defaults.iter().find(|spec| spec.name.eq_ignore_ascii_case(name)) {
                Some(spec) => args.set_value(spec.name, item.value.clone()),
                None => debug!(name = %name, "unknown argument discarded"),
            }
        }
    }
}

fn validate_side(args: &mut NormalizedArgs) -> Result<(), EngineError> {
    let Some(raw) = args.get("side").map(str::to_string) else {
        return Ok(());
    };
    let side: Side = raw
        .parse()
        .map_err(|_| EngineError::invalid(format!("invalid side '{raw}'")))?;
    set_side(args, side);
    Ok(())
}

fn set_side(args: &mut NormalizedArgs, side: Side) {
    args.side = Some(side);
    args.opposite_side = Some(side.opposite());
    args.set_value("side", side.as_str().to_string());
}

fn validate_trigger(args: &mut NormalizedArgs) {
    let Some(raw) = args.get("trigger").map(str::to_string) else {
        return;
    };
    let trigger = match raw.parse::<Trigger>() {
        Ok(t) => t,
        Err(_) => {
            warn!(trigger = %raw, "unknown trigger, using 'last'");
            Trigger::Last
        }
    };
    args.trigger = Some(trigger);
    args.set_value("trigger", trigger.as_str().to_string());
}

fn validate_background(args: &mut NormalizedArgs) {
    if args.get("background").is_some() {
        args.background = args.flag("background");
    }
}

async fn calculate_position(
    exchange: &Exchange,
    symbol: &str,
    args: &mut NormalizedArgs,
) -> Result<(), EngineError> {
    let (Some(side), Some(_), Some(position)) =
        (args.side, args.get("amount"), args.get("position").map(str::to_string))
    else {
        return Ok(());
    };
    let amount = args.decimal("amount")?.unwrap_or(Decimal::ZERO);

    let (side, amount, everything) = exchange
        .position_to_amount(symbol, &position, side, amount)
        .await?;

    if !position.trim().is_empty() && amount == Decimal::ZERO {
        return Err(EngineError::zero_size(format!(
            "position '{position}' leaves nothing to trade"
        )));
    }

    set_side(args, side);
    args.amount = Some(amount);
    args.is_everything = everything;
    args.set_value("amount", amount.to_string());
    Ok(())
}

async fn offset_to_price(
    exchange: &Exchange,
    symbol: &str,
    args: &mut NormalizedArgs,
) -> Result<(), EngineError> {
    let Some(raw) = args.get("offset").map(str::to_string) else {
        return Ok(());
    };
    let side = args.side()?;
    let spec: OffsetSpec = raw
        .parse()
        .map_err(|e| EngineError::invalid(format!("{e}")))?;
    let price = exchange.offset_to_price(symbol, side, &spec).await?;
    args.offset = Some(spec);
    args.order_price = Some(price);
    Ok(())
}

async fn calculate_amount(
    exchange: &Exchange,
    symbol: &str,
    args: &mut NormalizedArgs,
) -> Result<(), EngineError> {
    let (Some(side), Some(price), Some(_)) = (args.side, args.order_price, args.get("amount"))
    else {
        return Ok(());
    };
    let requested = match args.amount {
        Some(a) => a,
        None => args.decimal("amount")?.unwrap_or(Decimal::ZERO),
    };

    let clamped = exchange
        .order_size_from_amount(symbol, side, price, requested)
        .await?;
    if clamped == Decimal::ZERO {
        return Err(EngineError::zero_size(format!(
            "amount {requested} clamps to zero against balance and minimum size"
        )));
    }
    args.original_amount = Some(requested);
    args.amount = Some(clamped);
    args.set_value("amount", clamped.to_string());
    Ok(())
}
