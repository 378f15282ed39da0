use crate::pipeline::Transformer;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// One currency quote destined for the rates CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub effective_date: String,
}

/// Flattens an API payload into one row per quoted currency.
///
/// The payload must carry its own `base` currency; one without it yields no
/// rows. Rows are labeled with the date that was requested, not the date the
/// API echoes back: quotes for weekends and holidays come back stamped with
/// the previous trading day, and downstream joins need the transaction date.
pub struct RateTransformer;

impl Transformer for RateTransformer {
    type Key = String;
    type Raw = Value;
    type Row = RateRow;

    fn transform(&self, date: &String, payload: Value) -> Vec<RateRow> {
        let Some(base) = payload
            .get("base")
            .and_then(Value::as_str)
            .filter(|b| !b.is_empty())
        else {
            warn!("Payload for {} has no base currency", date);
            return Vec::new();
        };
        let Some(rates) = payload.get("rates").and_then(Value::as_object) else {
            warn!("Payload for {} has no rates object", date);
            return Vec::new();
        };

        let mut rows = Vec::with_capacity(rates.len());
        for (currency, value) in rates {
            match coerce_rate(value) {
                Some(rate) => rows.push(RateRow {
                    from_currency: base.to_string(),
                    to_currency: currency.clone(),
                    exchange_rate: rate,
                    effective_date: date.clone(),
                }),
                None => {
                    warn!(
                        "Skipping rate for {} due to invalid value: {}",
                        currency, value
                    );
                }
            }
        }
        rows
    }
}

/// Accepts numeric rates as JSON numbers or numeric strings.
fn coerce_rate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
