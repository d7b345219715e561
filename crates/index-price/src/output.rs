//! Output formatting of published prices

use rust_decimal::Decimal;
use serde::Serialize;

use index_core::{OutputFormat, Price};

#[derive(Serialize)]
struct PriceRecord<'a> {
    time: i64,
    amount: &'a Decimal,
}

pub fn format_price(price: &Price, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Csv => Ok(price.to_string()),
        OutputFormat::Json => {
            let record = PriceRecord {
                time: price.time.timestamp(),
                amount: &price.amount,
            };
            Ok(serde_json::to_string(&record)?)
        }
    }
}
