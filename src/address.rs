//! Cell address codec: `(row, col)` <-> A1-notation string.
//!
//! Rows are 1-based, columns are 0-based internally. Column letters follow the
//! usual bijective base-26 scheme: A, B, ..., Z, AA, AB, ....

use crate::error::CoreError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref ADDR_RE: Regex = Regex::new(r"^[A-Z]+[1-9][0-9]*$").unwrap();
}

/// A single cell address within a sheet.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub row: u32,
    pub col: u32,
}

impl Address {
    pub fn new(row: u32, col: u32) -> Self {
        Address { row, col }
    }

    /// Parse an A1-notation string (case-insensitive) into an address.
    pub fn decode(s: &str) -> Result<Address, CoreError> {
        let upper = s.trim().to_uppercase();
        if !ADDR_RE.is_match(&upper) {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }
        let split_at = upper
            .chars()
            .position(|c| c.is_ascii_digit())
            .expect("regex guarantees a digit exists");
        let (col_str, row_str) = upper.split_at(split_at);
        let col = decode_column(col_str);
        let row: u32 = row_str
            .parse()
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Ok(Address { row, col })
    }

    /// Render as upper-case A1 notation.
    pub fn encode(&self) -> String {
        format!("{}{}", encode_column(self.col), self.row)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// `A` -> 0, `Z` -> 25, `AA` -> 26, ...
pub fn decode_column(col_str: &str) -> u32 {
    let mut result: u32 = 0;
    for c in col_str.chars() {
        result = result * 26 + (c as u32 - 'A' as u32 + 1);
    }
    result - 1
}

/// `0` -> `A`, `25` -> `Z`, `26` -> `AA`, ...
pub fn encode_column(col: u32) -> String {
    let mut col = col + 1;
    let mut letters = Vec::new();
    while col > 0 {
        col -= 1;
        letters.push((b'A' + (col % 26) as u8) as char);
        col /= 26;
    }
    letters.iter().rev().collect()
}
