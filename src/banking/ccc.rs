const WEIGHTS: [u32; 10] = [1, 2, 4, 8, 5, 10, 9, 7, 3, 6];

/// Control digit of a 10-digit CCC block.
pub fn ccc_control_digit(digits: &[u8; 10]) -> u8 {
    let sum: u32 = digits
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(d, w)| *d as u32 * w)
        .sum();

    match 11 - sum % 11 {
        10 => 1,
        11 => 0,
        d => d as u8,
    }
}

/// Keeps only the digits of a CCC typed with separators.
pub fn canonize_ccc(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Checks both control digits of a 20-digit domestic account code
/// (`EEEE OOOO DD AAAAAAAAAA`). Separators are ignored.
pub fn validate_ccc(raw: &str) -> bool {
    let canonical = canonize_ccc(raw);
    if canonical.len() != 20 {
        return false;
    }

    let digits: Vec<u8> = canonical.bytes().map(|b| b - b'0').collect();

    let mut bank_block = [0u8; 10];
    bank_block[2..].copy_from_slice(&digits[0..8]);

    let mut account_block = [0u8; 10];
    account_block.copy_from_slice(&digits[10..20]);

    ccc_control_digit(&bank_block) == digits[8] && ccc_control_digit(&account_block) == digits[9]
}

/// `2100 0418 45 0200051332`
pub fn pretty_ccc(entity: u16, office: u16, check_digits: u8, account: u64) -> String {
    format!("{:04} {:04} {:02} {:010}", entity, office, check_digits, account)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonize() {
        assert_eq!(canonize_ccc("1234-5678 90.3344556677"), "12345678903344556677");
        assert_eq!(canonize_ccc("ABC123DEF456"), "123456");
        assert_eq!(canonize_ccc(""), "");
    }

    #[test]
    fn test_control_digit() {
        assert_eq!(ccc_control_digit(&[0, 0, 1, 2, 3, 4, 5, 6, 7, 8]), 0);
        assert_eq!(ccc_control_digit(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]), 1);
        // 11 - 0 => 0
        assert_eq!(ccc_control_digit(&[0; 10]), 0);
        assert_eq!(ccc_control_digit(&[1; 10]), 0);
    }

    #[test]
    fn test_validate_ccc() {
        assert!(validate_ccc("21000418450200051332"));
        assert!(validate_ccc("2100-0418-45-0200051332"));
        assert!(validate_ccc("0182 1666 31 0201503283"));
        assert!(validate_ccc("00000000000000000000"));
        assert!(validate_ccc("2100-0418-45-0200051332!!!"));

        assert!(!validate_ccc("21000418440200051332"));
        assert!(!validate_ccc("21000418550200051332"));
        assert!(!validate_ccc("99990418450200051332"));
        assert!(!validate_ccc("123456789"));
        assert!(!validate_ccc("2100A418B450200051332"));
        assert!(!validate_ccc(""));
    }

    #[test]
    fn test_pretty_ccc() {
        assert_eq!(pretty_ccc(2100, 418, 45, 200_051_332), "2100 0418 45 0200051332");
    }
}
