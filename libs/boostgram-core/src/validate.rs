use crate::error::CoreError;

/// Order links must be absolute http/https URLs.
pub fn validate_link(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed).map_err(|_| CoreError::InvalidLink)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::InvalidLink);
    }
    Ok(trimmed.to_string())
}

/// Domestic mobile number: exactly ten digits, leading 6-9. A +91 or 0
/// prefix is stripped first.
pub fn validate_phone(raw: &str) -> Result<String, CoreError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = digits
        .strip_prefix("91")
        .filter(|rest| rest.len() == 10)
        .or_else(|| digits.strip_prefix('0').filter(|rest| rest.len() == 10))
        .unwrap_or(&digits);

    if national.len() != 10 || !matches!(national.as_bytes()[0], b'6'..=b'9') {
        return Err(CoreError::InvalidPhone);
    }
    Ok(national.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_must_be_absolute_http() {
        assert!(validate_link("https://instagram.com/p/abc").is_ok());
        assert!(validate_link("http://t.me/channel").is_ok());
        assert!(validate_link("instagram.com/p/abc").is_err());
        assert!(validate_link("ftp://example.com/x").is_err());
        assert!(validate_link("not a link").is_err());
    }

    #[test]
    fn link_is_trimmed() {
        assert_eq!(
            validate_link("  https://youtu.be/xyz \n").unwrap(),
            "https://youtu.be/xyz"
        );
    }

    #[test]
    fn phone_accepts_national_and_prefixed_forms() {
        assert_eq!(validate_phone("9876543210").unwrap(), "9876543210");
        assert_eq!(validate_phone("+91 98765 43210").unwrap(), "9876543210");
        assert_eq!(validate_phone("09876543210").unwrap(), "9876543210");
    }

    #[test]
    fn phone_rejects_bad_shapes() {
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("5876543210").is_err()); // bad leading digit
        assert!(validate_phone("98765432101").is_err()); // eleven digits
        assert!(validate_phone("").is_err());
    }
}
