//! # Validators
//!
//! Document numbers (CPF, CNPJ, licence plates), e-mail addresses, URLs and
//! decimal strings. Every validator normalizes on success and returns `None`
//! on failure; callers attach the field error.

use crate::primitives::MAX_URL_LENGTH;

/// Keep only ASCII digits.
#[must_use]
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn digit_values(digits: &str) -> Vec<u32> {
    digits.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(values: &[u32]) -> bool {
    values.windows(2).all(|pair| pair[0] == pair[1])
}

/// Check digit of a CPF prefix (9 or 10 digits).
fn cpf_check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let rest = (sum * 10) % 11;
    if rest == 10 { 0 } else { rest }
}

/// Check digit of a CNPJ prefix (12 or 13 digits).
fn cnpj_check_digit(prefix: &[u32]) -> u32 {
    const WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let weights = &WEIGHTS[WEIGHTS.len() - prefix.len()..];
    let sum: u32 = prefix.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = sum % 11;
    if rest < 2 { 0 } else { 11 - rest }
}

/// Validate a CPF (individual taxpayer number). Returns the 11 digits.
#[must_use]
pub fn validate_cpf(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    let values = digit_values(&digits);
    if values.len() != 11 || all_same(&values) {
        return None;
    }
    let first = cpf_check_digit(&values[..9]);
    let second = cpf_check_digit(&values[..10]);
    (values[9] == first && values[10] == second).then_some(digits)
}

/// Validate a CNPJ (company taxpayer number). Returns the 14 digits.
#[must_use]
pub fn validate_cnpj(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    let values = digit_values(&digits);
    if values.len() != 14 || all_same(&values) {
        return None;
    }
    let first = cnpj_check_digit(&values[..12]);
    let second = cnpj_check_digit(&values[..13]);
    (values[12] == first && values[13] == second).then_some(digits)
}

/// CPF or CNPJ, decided by digit count.
#[must_use]
pub fn validate_taxpayer_number(raw: &str) -> Option<String> {
    match digits_only(raw).len() {
        11 => validate_cpf(raw),
        14 => validate_cnpj(raw),
        _ => None,
    }
}

/// Validate a licence plate, either `ABC1234` or Mercosul `ABC1D23`.
/// Returns it uppercase without separators.
#[must_use]
pub fn validate_plate(raw: &str) -> Option<String> {
    let plate: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let chars: Vec<char> = plate.chars().collect();
    if chars.len() != 7 {
        return None;
    }

    let letters = chars[..3].iter().all(char::is_ascii_uppercase);
    let fourth = chars[3].is_ascii_digit();
    let fifth = chars[4].is_ascii_digit() || chars[4].is_ascii_uppercase();
    let tail = chars[5..].iter().all(char::is_ascii_digit);

    (letters && fourth && fifth && tail).then_some(plate)
}

/// Light e-mail check: one `@`, non-empty local part, dotted domain, no spaces.
#[must_use]
pub fn validate_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    valid.then_some(email)
}

/// Absolute http(s) URL without whitespace.
#[must_use]
pub fn validate_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let valid = !rest.is_empty()
        && url.len() <= MAX_URL_LENGTH
        && !url.chars().any(char::is_whitespace);
    valid.then(|| url.to_string())
}

/// Decimal number: optional sign, digits, optional fraction. `,` is accepted
/// as decimal separator and normalized to `.`.
#[must_use]
pub fn validate_decimal(raw: &str) -> Option<String> {
    let value = raw.trim().replace(',', ".");
    let unsigned = value.strip_prefix('-').unwrap_or(&value);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let whole_ok = !whole.is_empty() && whole.chars().all(|c| c.is_ascii_digit());
    let fraction_ok = fraction.is_none_or(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()));
    (whole_ok && fraction_ok).then_some(value)
}
