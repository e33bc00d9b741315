//! ISBN normalisation.

use super::error::DomainError;

/// Strips separators and validates the digit count (10 or 13). A trailing
/// `X` check digit is accepted for ISBN-10.
pub fn normalize(raw: &str) -> Result<String, DomainError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !cleaned.is_ascii() {
        return Err(DomainError::invalid_isbn(raw));
    }

    let valid = match cleaned.len() {
        13 => cleaned.bytes().all(|b| b.is_ascii_digit()),
        10 => {
            let (body, check) = cleaned.split_at(9);
            body.bytes().all(|b| b.is_ascii_digit())
                && check.bytes().all(|b| b.is_ascii_digit() || b == b'X')
        }
        _ => false,
    };

    if valid {
        Ok(cleaned)
    } else {
        Err(DomainError::invalid_isbn(raw))
    }
}

/// First thirteen-digit ISBN in an upstream list.
pub fn first_isbn13<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    candidates
        .into_iter()
        .filter_map(|candidate| normalize(candidate).ok())
        .find(|isbn| isbn.len() == 13)
}
