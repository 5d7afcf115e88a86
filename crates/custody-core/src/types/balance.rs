//! Token balances held at a custody address.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: String,
    pub amount: Decimal,
    pub decimals: Option<u32>,
}

impl TokenBalance {
    /// Normalize a balances response: a bare array, or `{ "balances": [...] }`.
    ///
    /// Each entry names its token as `symbol` or `token` and its amount as
    /// `amount` or `balances.total`, as a string or a number.
    #[allow(clippy::result_large_err)]
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>> {
        let entries = value
            .as_array()
            .or_else(|| value.get("balances").and_then(Value::as_array))
            .ok_or_else(|| Error::protocol("balances response is not a list"))?;

        entries.iter().map(Self::from_entry).collect()
    }

    #[allow(clippy::result_large_err)]
    fn from_entry(entry: &Value) -> Result<Self> {
        let token = entry
            .get("symbol")
            .or_else(|| entry.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("balance entry has no token symbol"))?
            .to_string();

        let raw_amount = entry
            .get("amount")
            .or_else(|| entry.pointer("/balances/total"))
            .ok_or_else(|| Error::protocol(format!("balance entry for {} has no amount", token)))?;

        let amount = match raw_amount {
            Value::String(s) => Decimal::from_str(s).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            Error::protocol(format!("balance for {} is not a number: {}", token, raw_amount))
        })?;

        Ok(Self {
            token,
            amount,
            decimals: entry
                .get("decimals")
                .and_then(Value::as_u64)
                .and_then(|d| u32::try_from(d).ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_symbol_and_amount_entries() {
        let raw = json!([
            { "symbol": "sol", "decimals": 9, "amount": "0.25" },
            { "symbol": "usdc", "decimals": 6, "amount": 12.5 }
        ]);
        let balances = TokenBalance::list_from_value(&raw).unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].token, "sol");
        assert_eq!(balances[0].amount, Decimal::new(25, 2));
        assert_eq!(balances[1].amount, Decimal::new(125, 1));
        assert_eq!(balances[1].decimals, Some(6));
    }

    #[test]
    fn test_parses_legacy_total_shape() {
        let raw = json!({ "balances": [{ "token": "usdc", "balances": { "total": "3" } }] });
        let balances = TokenBalance::list_from_value(&raw).unwrap();
        assert_eq!(balances[0].token, "usdc");
        assert_eq!(balances[0].amount, Decimal::from(3));
    }

    #[test]
    fn test_rejects_non_numeric_amount() {
        let raw = json!([{ "symbol": "usdc", "amount": "lots" }]);
        assert!(matches!(
            TokenBalance::list_from_value(&raw),
            Err(Error::Protocol { .. })
        ));
    }
}
