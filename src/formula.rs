//! Formula lexer/parser (C2): recognize formulas, validate syntax, and
//! expand textual cell/range references.

use crate::address::Address;
use crate::error::CoreError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    // A range requires two single-cell patterns either side of ':'.
    pub(crate) static ref RANGE_RE: Regex = Regex::new(r"([A-Z]+[0-9]+):([A-Z]+[0-9]+)").unwrap();
    pub(crate) static ref SINGLE_RE: Regex = Regex::new(r"[A-Z]+[0-9]+").unwrap();
    pub(crate) static ref AGGREGATE_RE: Regex =
        Regex::new(r"(?i)(SUM|AVERAGE|COUNT)\s*\(([^()]*)\)").unwrap();
}

/// True iff the trimmed string begins with `=`.
pub fn is_formula(s: &str) -> bool {
    s.trim().starts_with('=')
}

/// Validate a formula's syntax. Does not check semantics (cycles, refs).
pub fn validate(s: &str) -> Result<(), CoreError> {
    let trimmed = s.trim();
    if !trimmed.starts_with('=') {
        return Err(CoreError::Parse(format!(
            "formula must start with '=': {s}"
        )));
    }
    if trimmed == "=" {
        return Err(CoreError::Parse("empty formula body".to_string()));
    }
    let mut depth: i32 = 0;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(CoreError::Parse(format!(
                        "unbalanced parentheses in formula: {s}"
                    )));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(CoreError::Parse(format!(
            "unbalanced parentheses in formula: {s}"
        )));
    }
    Ok(())
}

/// Expand every cell address textually reachable from the formula body
/// (ranges expand to their full rectangular cover; duplicates are
/// deduplicated via the `BTreeSet`).
pub fn extract_refs(s: &str) -> Result<BTreeSet<Address>, CoreError> {
    let body = s.trim().trim_start_matches('=');
    let upper = body.to_uppercase();
    let mut refs: BTreeSet<Address> = BTreeSet::new();
    let mut consumed: Vec<(usize, usize)> = Vec::new();

    for m in RANGE_RE.find_iter(&upper) {
        consumed.push((m.start(), m.end()));
        let caps = RANGE_RE.captures(m.as_str()).unwrap();
        let start = Address::decode(&caps[1])?;
        let end = Address::decode(&caps[2])?;
        let (r0, r1) = (start.row.min(end.row), start.row.max(end.row));
        let (c0, c1) = (start.col.min(end.col), start.col.max(end.col));
        for r in r0..=r1 {
            for c in c0..=c1 {
                refs.insert(Address::new(r, c));
            }
        }
    }

    for m in SINGLE_RE.find_iter(&upper) {
        // Skip anything that was already covered by a range match so we
        // don't re-decode substrings that a range already consumed.
        if consumed
            .iter()
            .any(|&(s, e)| m.start() >= s && m.end() <= e)
        {
            continue;
        }
        refs.insert(Address::decode(m.as_str())?);
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formula_prefix() {
        assert!(is_formula("=A1+A2"));
        assert!(is_formula("  =A1  "));
        assert!(!is_formula("A1"));
        assert!(!is_formula("42"));
    }

    #[test]
    fn validate_rejects_bad_syntax() {
        assert!(validate("A1").is_err());
        assert!(validate("=").is_err());
        assert!(validate("=SUM(A1:A3").is_err());
        assert!(validate("=SUM(A1:A3))").is_err());
        assert!(validate("=SUM(A1:A3)").is_ok());
    }

    #[test]
    fn extract_refs_single_cells() {
        let refs = extract_refs("=A1+B2").unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&Address::new(1, 0)));
        assert!(refs.contains(&Address::new(2, 1)));
    }

    #[test]
    fn extract_refs_range_expands_rectangle() {
        let refs = extract_refs("=SUM(A1:B2)").unwrap();
        assert_eq!(refs.len(), 4);
        for (r, c) in [(1, 0), (1, 1), (2, 0), (2, 1)] {
            assert!(refs.contains(&Address::new(r, c)));
        }
    }

    #[test]
    fn extract_refs_reversed_range_same_as_forward() {
        let forward = extract_refs("=SUM(A1:A3)").unwrap();
        let reversed = extract_refs("=SUM(A3:A1)").unwrap();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn function_names_are_not_cell_refs() {
        let refs = extract_refs("=SUM(A1:A3)").unwrap();
        assert!(!refs.iter().any(|a| a.encode() == "SUM"));
    }

    #[test]
    fn dedup_range_and_single_overlap() {
        let refs = extract_refs("=A1+SUM(A1:A2)").unwrap();
        assert_eq!(refs.len(), 2);
    }
}
