use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use super::repo::CartIngredientRow;

/// One line of the purchase list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Sum amounts per (name, unit) across every cart recipe, ordered by name then unit.
pub fn aggregate(rows: &[CartIngredientRow]) -> Vec<PurchaseItem> {
    let mut totals: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for row in rows {
        *totals
            .entry((row.name.as_str(), row.measurement_unit.as_str()))
            .or_insert(0) += i64::from(row.amount);
    }
    totals
        .into_iter()
        .map(|((name, unit), amount)| PurchaseItem {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        })
        .collect()
}

/// `name - amount unit` per line.
pub fn render(items: &[PurchaseItem]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "{} - {} {}", item.name, item.amount, item.measurement_unit);
    }
    out
}
