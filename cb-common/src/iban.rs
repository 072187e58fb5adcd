//! Romanian IBAN shape validation.
//!
//! Payout account identifiers are validated on *plaintext* before they are
//! sealed for storage (see [`crate::seal`]), and again when a payout
//! transitions to SENT. The accepted shape is `RO` + 2 check digits +
//! 20 to 30 alphanumerics, total length in `[24, 34]`.

use serde::{Deserialize, Serialize};

/// Reasons an IBAN can fail shape validation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[derive(Serialize, Deserialize)]
pub enum IbanError {
    #[error("IBAN is too short")]
    TooShort,
    #[error("IBAN is too long")]
    TooLong,
    #[error("IBAN must start with the RO country code")]
    BadCountryCode,
    #[error("IBAN check digits must be numeric")]
    BadCheckDigits,
    #[error("IBAN contains a non-alphanumeric character")]
    BadCharacter,
}

const MIN_LEN: usize = 24;
const MAX_LEN: usize = 34;

/// Validates the shape of a Romanian IBAN. Whitespace is not tolerated;
/// callers normalize (trim + uppercase) before validation.
pub fn validate_romanian(iban: &str) -> Result<(), IbanError> {
    if iban.len() < MIN_LEN {
        return Err(IbanError::TooShort);
    }
    if iban.len() > MAX_LEN {
        return Err(IbanError::TooLong);
    }

    let bytes = iban.as_bytes();
    if &bytes[..2] != b"RO" {
        return Err(IbanError::BadCountryCode);
    }
    if !bytes[2..4].iter().all(u8::is_ascii_digit) {
        return Err(IbanError::BadCheckDigits);
    }
    // Length bounds already guarantee the BBAN is 20..=30 chars.
    if !bytes[4..]
        .iter()
        .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    {
        return Err(IbanError::BadCharacter);
    }

    Ok(())
}

/// Trim + uppercase an IBAN as entered by a user.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod test {
    use super::*;

    const VALID: &str = "RO49AAAA1B31007593840000";

    #[test]
    fn accepts_well_formed() {
        assert_eq!(validate_romanian(VALID), Ok(()));
        // Maximum length: RO + 2 digits + 30 alphanumerics.
        let long = format!("RO12{}", "A".repeat(30));
        assert_eq!(validate_romanian(&long), Ok(()));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(validate_romanian(""), Err(IbanError::TooShort));
        assert_eq!(
            validate_romanian(&"R".repeat(23)),
            Err(IbanError::TooShort)
        );
        assert_eq!(
            validate_romanian(&format!("RO12{}", "A".repeat(31))),
            Err(IbanError::TooLong)
        );
        assert_eq!(
            validate_romanian("DE49AAAA1B31007593840000"),
            Err(IbanError::BadCountryCode)
        );
        assert_eq!(
            validate_romanian("ROXXAAAA1B31007593840000"),
            Err(IbanError::BadCheckDigits)
        );
        assert_eq!(
            validate_romanian("RO49aaaa1B31007593840000"),
            Err(IbanError::BadCharacter)
        );
    }

    #[test]
    fn normalize_strips_and_uppercases() {
        let raw = " ro49 aaaa 1b31 0075 9384 0000 ";
        assert_eq!(normalize(raw), VALID);
        assert_eq!(validate_romanian(&normalize(raw)), Ok(()));
    }
}
