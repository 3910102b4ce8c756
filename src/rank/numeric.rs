//! Deterministic ordering of rows by numeric column values

use crate::error::{Error, Result};
use crate::meta::NumericCandidate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Sort direction for a ranked column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(Error::InvalidInput(format!(
                "sort direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// Parse a cell as a finite number; blank and non-numeric cells are `None`
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A row that survived numeric filtering
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub row_index: i64,
    pub primary: f64,
    pub tie: Option<f64>,
}

/// Order candidates by the primary value, then the optional tie value, then row_index.
///
/// Rows with a non-numeric primary value are dropped. With `tie` set, rows
/// with a non-numeric tie value are dropped too.
pub fn rank_numeric(
    candidates: &[NumericCandidate],
    primary: SortDirection,
    tie: Option<SortDirection>,
    limit: usize,
) -> Vec<RankedRow> {
    let mut rows: Vec<RankedRow> = candidates
        .iter()
        .filter_map(|c| {
            let primary_value = c.primary.as_deref().and_then(parse_number)?;
            let tie_value = match tie {
                Some(_) => Some(c.tie.as_deref().and_then(parse_number)?),
                None => None,
            };
            Some(RankedRow {
                row_index: c.row_index,
                primary: primary_value,
                tie: tie_value,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        primary
            .apply(a.primary.total_cmp(&b.primary))
            .then_with(|| match (tie, a.tie, b.tie) {
                (Some(dir), Some(x), Some(y)) => dir.apply(x.total_cmp(&y)),
                _ => Ordering::Equal,
            })
            .then_with(|| a.row_index.cmp(&b.row_index))
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(idx: i64, primary: Option<&str>, tie: Option<&str>) -> NumericCandidate {
        NumericCandidate {
            row_index: idx,
            primary: primary.map(str::to_string),
            tie: tie.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 10 "), Some(10.0));
        assert_eq!(parse_number("-2.5"), Some(-2.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("up".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_non_numeric_values_are_excluded() {
        let candidates = vec![
            candidate(0, Some("10"), None),
            candidate(1, Some("abc"), None),
            candidate(2, Some("30"), None),
        ];
        let ranked = rank_numeric(&candidates, SortDirection::Desc, None, 5);
        assert_eq!(
            ranked.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![2, 0]
        );
        assert_eq!(ranked[0].primary, 30.0);

        let lowest = rank_numeric(&candidates, SortDirection::Asc, None, 1);
        assert_eq!(lowest.len(), 1);
        assert_eq!(lowest[0].row_index, 0);
    }

    #[test]
    fn test_tie_column() {
        let candidates = vec![
            candidate(0, Some("5"), Some("3")),
            candidate(1, Some("5"), Some("1")),
            candidate(2, Some("5"), Some("n/a")),
            candidate(3, Some("4"), Some("0")),
        ];
        let ranked = rank_numeric(
            &candidates,
            SortDirection::Desc,
            Some(SortDirection::Asc),
            10,
        );
        assert_eq!(
            ranked.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![1, 0, 3]
        );

        let ranked = rank_numeric(
            &candidates,
            SortDirection::Desc,
            Some(SortDirection::Desc),
            1,
        );
        assert_eq!(ranked[0].row_index, 0);
        assert_eq!(ranked[0].tie, Some(3.0));
    }

    #[test]
    fn test_equal_values_keep_row_order() {
        let candidates = vec![
            candidate(4, Some("1"), None),
            candidate(2, Some("1"), None),
        ];
        let ranked = rank_numeric(&candidates, SortDirection::Desc, None, 2);
        assert_eq!(ranked[0].row_index, 2);
        assert_eq!(ranked[1].row_index, 4);
    }
}
