//! Syntactic checks on share text typed by a party.
//!
//! Vault prints unseal keys as hex and base64; both are accepted. Parties
//! often paste the key in double quotes (`/unseal "abcd..."`), so one pair of
//! surrounding quotes is stripped. Nothing beyond shape is checked here:
//! whether a share is genuine is only known to Vault.

use zeroize::Zeroizing;

const MIN_LEN: usize = 16;
const MAX_LEN: usize = 256;

/// Why share text was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareTextError {
    Empty,
    Length,
    Characters,
}

impl std::fmt::Display for ShareTextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("no key was provided"),
            Self::Length => write!(f, "key must be {}-{} characters", MIN_LEN, MAX_LEN),
            Self::Characters => f.write_str("key must be hex or base64"),
        }
    }
}

/// Extract a share from raw command text.
pub fn parse_share(raw: &str) -> Result<Zeroizing<String>, ShareTextError> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        return Err(ShareTextError::Empty);
    }
    if unquoted.len() < MIN_LEN || unquoted.len() > MAX_LEN {
        return Err(ShareTextError::Length);
    }
    if !unquoted.chars().all(is_share_char) {
        return Err(ShareTextError::Characters);
    }

    let body = unquoted.trim_end_matches('=');
    if body.contains('=') || unquoted.len() - body.len() > 2 {
        return Err(ShareTextError::Characters);
    }

    Ok(Zeroizing::new(unquoted.to_string()))
}

fn is_share_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
}
