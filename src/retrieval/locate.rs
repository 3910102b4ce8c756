//! Column locator for fused results

use super::intent::tokenize;
use crate::meta::RowData;
use std::collections::HashSet;

/// Most columns returned for one row
pub const MAX_LOCATED_COLUMNS: usize = 6;

/// Columns of `row` most relevant to `query`.
///
/// Columns whose name appears in the query win outright. Otherwise columns
/// are scored by how many query tokens their value shares; with no overlap
/// at all the first columns of the table are returned. Ties keep table order.
pub fn pick_columns(query: &str, columns: &[String], row: &RowData) -> Vec<String> {
    let query_lower = query.to_lowercase();

    let explicit: Vec<String> = columns
        .iter()
        .filter(|c| !c.is_empty() && query_lower.contains(&c.to_lowercase()))
        .take(MAX_LOCATED_COLUMNS)
        .cloned()
        .collect();
    if !explicit.is_empty() {
        return explicit;
    }

    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    let mut scored: Vec<(&String, usize)> = columns
        .iter()
        .map(|c| {
            let value = row.get(c).cloned().flatten().unwrap_or_default();
            let value_tokens: HashSet<String> = tokenize(&value).into_iter().collect();
            (c, query_tokens.intersection(&value_tokens).count())
        })
        .collect();
    // Stable: equal scores stay in table order
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let best: Vec<String> = scored
        .into_iter()
        .filter(|(_, score)| *score > 0)
        .take(MAX_LOCATED_COLUMNS)
        .map(|(c, _)| c.clone())
        .collect();

    if best.is_empty() {
        columns.iter().take(MAX_LOCATED_COLUMNS).cloned().collect()
    } else {
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: &[(&str, Option<&str>)]) -> RowData {
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_named_columns_win() {
        let columns = names(&["Price", "city", "name"]);
        let data = row(&[("Price", Some("10")), ("city", Some("Oslo")), ("name", Some("x"))]);
        assert_eq!(
            pick_columns("cheapest price by City", &columns, &data),
            names(&["Price", "city"])
        );
    }

    #[test]
    fn test_value_overlap_ranks_columns() {
        let columns = names(&["id", "title", "body"]);
        let data = row(&[
            ("id", Some("7")),
            ("title", Some("Battery drains fast")),
            ("body", Some("the battery drains overnight, fast")),
        ]);
        assert_eq!(
            pick_columns("battery drains overnight", &columns, &data),
            names(&["body", "title"])
        );
    }

    #[test]
    fn test_no_overlap_falls_back_to_leading_columns() {
        let columns: Vec<String> = (0..8).map(|i| format!("c{}", i)).collect();
        let data = row(&[("c0", Some("alpha")), ("c1", None)]);
        assert_eq!(
            pick_columns("zzz", &columns, &data),
            columns[..MAX_LOCATED_COLUMNS].to_vec()
        );
    }

    #[test]
    fn test_ties_keep_table_order() {
        let columns = names(&["b", "a"]);
        let data = row(&[("b", Some("red")), ("a", Some("red"))]);
        assert_eq!(pick_columns("red", &columns, &data), names(&["b", "a"]));
    }
}
