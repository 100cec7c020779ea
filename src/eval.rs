//! Expression evaluator (C4): substitutes referenced values, computes
//! arithmetic, implements SUM/AVERAGE/COUNT, and emits error symbols.
//!
//! Pure: given the same `formula` and `values`, [`evaluate`] always produces
//! the same output. Value-level errors (`#DIV/0!`, `#REF!`, ...) are plain
//! strings, never exceptions — see the module doc of [`crate::error`].

use crate::address::Address;
use crate::formula::{self, AGGREGATE_RE, SINGLE_RE};
use std::collections::HashMap;

/// Evaluate a formula (or pass a non-formula value through verbatim)
/// against the current snapshot of committed values.
pub fn evaluate(raw: &str, values: &HashMap<Address, String>) -> String {
    if !formula::is_formula(raw) {
        return raw.to_string();
    }
    let body = raw.trim().trim_start_matches('=').trim().to_uppercase();

    let after_aggregates = match substitute_aggregates(&body, values) {
        Ok(s) => s,
        Err(symbol) => return symbol,
    };
    let after_refs = match substitute_refs(&after_aggregates, values) {
        Ok(s) => s,
        Err(symbol) => return symbol,
    };
    match eval_arithmetic(&after_refs) {
        Ok(value) => classify(value),
        Err(()) => "#ERROR!".to_string(),
    }
}

/// Step 2: replace `SUM`/`AVERAGE`/`COUNT` calls with their numeric result.
/// Returns `Err(error_symbol)` if a referenced cell's value is itself an
/// error, per the propagation rule shared with [`substitute_refs`].
fn substitute_aggregates(body: &str, values: &HashMap<Address, String>) -> Result<String, String> {
    let mut out = String::new();
    let mut last_end = 0;
    for caps in AGGREGATE_RE.captures_iter(body) {
        let whole = caps.get(0).unwrap();
        out.push_str(&body[last_end..whole.start()]);

        let func = caps[1].to_uppercase();
        let args = caps[2].trim();
        let refs = formula::extract_refs(&format!("={args}")).map_err(|_| "#REF!".to_string())?;

        let mut sum = 0.0;
        let mut count: u64 = 0;
        for addr in &refs {
            let v = values.get(addr).cloned().unwrap_or_else(|| "0".to_string());
            if v.starts_with('#') {
                return Err(v);
            }
            if let Ok(n) = v.parse::<f64>() {
                sum += n;
                count += 1;
            }
            // non-numeric text: skipped for SUM/AVERAGE/COUNT
        }

        let result = match func.as_str() {
            "SUM" => sum,
            "AVERAGE" => {
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            }
            "COUNT" => count as f64,
            _ => 0.0,
        };
        out.push_str(&format_number(result));
        last_end = whole.end();
    }
    out.push_str(&body[last_end..]);
    Ok(out)
}

/// Step 3: replace remaining bare cell references with their numeric form.
fn substitute_refs(body: &str, values: &HashMap<Address, String>) -> Result<String, String> {
    let mut out = String::new();
    let mut last_end = 0;
    for m in SINGLE_RE.find_iter(body) {
        out.push_str(&body[last_end..m.start()]);
        let num = match Address::decode(m.as_str()) {
            Ok(addr) => {
                let v = values.get(&addr).cloned().unwrap_or_else(|| "0".to_string());
                if v.starts_with('#') {
                    return Err(v);
                }
                v.parse::<f64>().unwrap_or(0.0)
            }
            // A malformed "reference" (e.g. a row of 0) is treated as a
            // reference error rather than panicking the substitution pass.
            Err(_) => return Err("#REF!".to_string()),
        };
        out.push_str(&format_number(num));
        last_end = m.end();
    }
    out.push_str(&body[last_end..]);
    Ok(out)
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn classify(value: f64) -> String {
    if value.is_infinite() {
        "#DIV/0!".to_string()
    } else if value.is_nan() {
        "#NUM!".to_string()
    } else {
        format_number(value)
    }
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ()> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Num(text.parse::<f64>().map_err(|_| ())?));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(()),
            });
            i += 1;
        }
    }
    Ok(tokens)
}

/// Evaluate `+ - * /` with parentheses over `f64` via recursive descent.
/// Division by zero yields an infinity (classified downstream as
/// `#DIV/0!`); this function never divides-by-zero-panics because `f64`
/// division is total.
fn eval_arithmetic(expr: &str) -> Result<f64, ()> {
    let tokens = tokenize(expr)?;
    let mut pos = 0;
    let value = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(());
    }
    Ok(value)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<f64, ()> {
    let mut value = parse_term(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Token::Plus) => {
                *pos += 1;
                value += parse_term(tokens, pos)?;
            }
            Some(Token::Minus) => {
                *pos += 1;
                value -= parse_term(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_term(tokens: &[Token], pos: &mut usize) -> Result<f64, ()> {
    let mut value = parse_factor(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Token::Star) => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            Some(Token::Slash) => {
                *pos += 1;
                value /= parse_factor(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &[Token], pos: &mut usize) -> Result<f64, ()> {
    match tokens.get(*pos) {
        Some(Token::Minus) => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        Some(Token::Plus) => {
            *pos += 1;
            parse_factor(tokens, pos)
        }
        Some(Token::Num(n)) => {
            let n = *n;
            *pos += 1;
            Ok(n)
        }
        Some(Token::LParen) => {
            *pos += 1;
            let value = parse_expr(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(value)
                }
                _ => Err(()),
            }
        }
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(row: u32, col: u32) -> Address {
        Address::new(row, col)
    }

    #[test]
    fn non_formula_passes_through() {
        let values = HashMap::new();
        assert_eq!(evaluate("hello", &values), "hello");
        assert_eq!(evaluate("42", &values), "42");
    }

    #[test]
    fn simple_addition() {
        let mut values = HashMap::new();
        values.insert(addr(1, 0), "10".to_string());
        values.insert(addr(2, 0), "20".to_string());
        assert_eq!(evaluate("=A1+A2", &values), "30");
    }

    #[test]
    fn range_sum_plus_literal() {
        let mut values = HashMap::new();
        values.insert(addr(1, 0), "10".to_string());
        values.insert(addr(2, 0), "20".to_string());
        values.insert(addr(3, 0), "30".to_string());
        assert_eq!(evaluate("=SUM(A1:A3)+5", &values), "65");
    }

    #[test]
    fn average_and_count() {
        let mut values = HashMap::new();
        values.insert(addr(1, 0), "10".to_string());
        values.insert(addr(2, 0), "text".to_string());
        values.insert(addr(3, 0), "30".to_string());
        assert_eq!(evaluate("=AVERAGE(A1:A3)", &values), "20");
        assert_eq!(evaluate("=COUNT(A1:A3)", &values), "2");
    }

    #[test]
    fn missing_ref_defaults_to_zero() {
        let values = HashMap::new();
        assert_eq!(evaluate("=A1+5", &values), "5");
    }

    #[test]
    fn division_by_zero_is_error_symbol() {
        let values = HashMap::new();
        assert_eq!(evaluate("=10/0", &values), "#DIV/0!");
    }

    #[test]
    fn zero_over_zero_is_num_error() {
        let values = HashMap::new();
        assert_eq!(evaluate("=0/0", &values), "#NUM!");
    }

    #[test]
    fn error_dependency_propagates() {
        let mut values = HashMap::new();
        values.insert(addr(1, 0), "#DIV/0!".to_string());
        assert_eq!(evaluate("=A1+1", &values), "#DIV/0!");
    }

    #[test]
    fn non_numeric_dependency_treated_as_zero() {
        let mut values = HashMap::new();
        values.insert(addr(1, 0), "hello".to_string());
        assert_eq!(evaluate("=A1+5", &values), "5");
    }

    #[test]
    fn parenthesized_precedence() {
        let values = HashMap::new();
        assert_eq!(evaluate("=(2+3)*4", &values), "20");
    }

    #[test]
    fn unary_minus() {
        let values = HashMap::new();
        assert_eq!(evaluate("=-5+10", &values), "5");
    }

    #[test]
    fn malformed_arithmetic_is_parse_error() {
        let values = HashMap::new();
        assert_eq!(evaluate("=5+*3", &values), "#ERROR!");
    }
}
