use pingpong_common::error::{PingpongError, Result};

/// Returns true iff `value` matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_token(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub fn validate_token(value: &str) -> Result<()> {
    if is_valid_token(value) {
        Ok(())
    } else {
        Err(PingpongError::InvalidIdentifier(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifier_tokens() {
        for token in ["a", "_", "requests_total", "A1_b2", "__name"] {
            assert!(is_valid_token(token), "{token}");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for token in ["", "1abc", "a-b", "a:b", "with space", "é", "a.b"] {
            assert!(!is_valid_token(token), "{token}");
        }

        assert!(matches!(
            validate_token("9lives"),
            Err(PingpongError::InvalidIdentifier(name)) if name == "9lives"
        ));
    }
}
