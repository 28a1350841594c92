use super::ccc::validate_ccc;

/// Expected IBAN lengths for SEPA countries. Other countries fall back to the
/// ISO 13616 bounds.
const IBAN_LENGTHS: &[(&str, usize)] = &[
    ("AD", 24), ("AT", 20), ("BE", 16), ("BG", 22), ("CH", 21), ("CY", 28),
    ("CZ", 24), ("DE", 22), ("DK", 18), ("EE", 20), ("ES", 24), ("FI", 18),
    ("FR", 27), ("GB", 22), ("GI", 23), ("GR", 27), ("HR", 21), ("HU", 28),
    ("IE", 22), ("IS", 26), ("IT", 27), ("LI", 21), ("LT", 20), ("LU", 20),
    ("LV", 21), ("MC", 27), ("MT", 31), ("NL", 18), ("NO", 15), ("PL", 28),
    ("PT", 25), ("RO", 24), ("SE", 24), ("SI", 19), ("SK", 24), ("SM", 27),
    ("VA", 22),
];

/// Strips whitespace and upper-cases.
pub fn normalize_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Remainder of the numeric re-encoding (`A` = 10 … `Z` = 35) modulo 97.
fn mod97(input: &str) -> Option<u32> {
    let mut remainder: u32 = 0;
    for c in input.chars() {
        let value = c.to_digit(36)?;
        remainder = if value < 10 {
            (remainder * 10 + value) % 97
        } else {
            (remainder * 100 + value) % 97
        };
    }
    Some(remainder)
}

/// Builds the ES IBAN of a domestic account code.
///
/// Returns `None` when a part does not fit its field width.
pub fn iban_from_ccc(entity: u16, office: u16, check_digits: u8, account: u64) -> Option<String> {
    if entity > 9_999 || office > 9_999 || check_digits > 99 || account > 9_999_999_999 {
        return None;
    }

    let bban = format!("{:04}{:04}{:02}{:010}", entity, office, check_digits, account);
    // "ES00" moved to the end: E=14, S=28
    let remainder = mod97(&format!("{}142800", bban))?;
    Some(format!("ES{:02}{}", 98 - remainder, bban))
}

/// ISO 13616 structure and mod-97 check.
pub fn validate_iban(raw: &str) -> bool {
    let iban = normalize_iban(raw);

    if iban.len() < 15 || iban.len() > 34 || !iban.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    let (country, rest) = iban.split_at(2);
    if !country.chars().all(|c| c.is_ascii_alphabetic()) || !rest[..2].chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    if let Some((_, len)) = IBAN_LENGTHS.iter().find(|(code, _)| *code == country) {
        if iban.len() != *len {
            return false;
        }
    }

    let rearranged = format!("{}{}", &iban[4..], &iban[..4]);
    mod97(&rearranged) == Some(1)
}

/// The domestic account code embedded in a Spanish IBAN, when both the IBAN
/// and the CCC control digits are valid.
pub fn ccc_from_spanish_iban(raw: &str) -> Option<String> {
    let iban = normalize_iban(raw);
    if !iban.starts_with("ES") || !validate_iban(&iban) {
        return None;
    }

    let ccc = &iban[4..];
    validate_ccc(ccc).then(|| ccc.to_string())
}
