use serde::Serialize;

/// A SEPA return/reject reason as reported by the debtor's bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SepaReason {
    pub code: &'static str,
    pub error: bool,
    pub warn: bool,
    pub text: &'static str,
}

const fn reason(code: &'static str, error: bool, warn: bool, text: &'static str) -> SepaReason {
    SepaReason { code, error, warn, text }
}

pub const SEPA_RETURNED_REASONS: [SepaReason; 24] = [
    reason("AC01", true, true, "IBAN or BIC is incorrect."),
    reason("AC04", true, false, "Account closed."),
    reason("AC06", true, false, "Account blocked."),
    reason("AC13", true, true, "Debtor account is a consumer account not eligible for business-to-business debits."),
    reason("AG01", true, false, "Savings account, direct debits not allowed."),
    reason("AG02", false, true, "Wrong sequence type (e.g. RCUR without a previous FRST)."),
    reason("AM04", false, false, "Insufficient funds."),
    reason("AM05", false, true, "Duplicate collection (repeated id or two FRST debits)."),
    reason("BE01", true, false, "Debtor name does not match the account holder."),
    reason("BE05", false, false, "Creditor identifier incorrect."),
    reason("FF01", false, true, "Invalid transaction code or file format."),
    reason("FF05", false, true, "Direct debit type incorrect."),
    reason("MD01", false, false, "No valid mandate."),
    reason("MD02", false, false, "Mandate data missing or incorrect."),
    reason("MD06", false, false, "Refund requested by the debtor (within 8 weeks)."),
    reason("MD07", true, false, "Account holder deceased."),
    reason("MS02", false, false, "Refused by the debtor."),
    reason("MS03", false, false, "Reason not specified by the bank."),
    reason("RC01", true, true, "BIC is incorrect."),
    reason("RR01", true, true, "Debtor identification legally required is missing or insufficient."),
    reason("RR02", true, true, "Debtor name or address legally required is missing or insufficient."),
    reason("RR03", false, true, "Creditor name or address legally required is missing or insufficient."),
    reason("RR04", true, true, "Regulatory reason. Contact the bank for details."),
    reason("SL01", true, false, "Blocked by the debtor bank (blacklist or not in the authorised creditors list)."),
];

/// Looks a reason code up, ignoring surrounding whitespace and case.
pub fn sepa_reason(code: &str) -> Option<&'static SepaReason> {
    let code = code.trim();
    SEPA_RETURNED_REASONS
        .iter()
        .find(|r| r.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let r = sepa_reason(" ac04 ").unwrap();
        assert_eq!(r.code, "AC04");
        assert!(r.error);
        assert!(!r.warn);
    }

    #[test]
    fn test_unknown_code() {
        assert!(sepa_reason("ZZ99").is_none());
        assert!(sepa_reason("").is_none());
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in SEPA_RETURNED_REASONS.iter().enumerate() {
            for b in &SEPA_RETURNED_REASONS[i + 1..] {
                assert_ne!(a.code, b.code);
            }
        }
    }

    #[test]
    fn test_soft_returns() {
        for code in ["AM04", "MD06", "MS02", "MS03"] {
            let r = sepa_reason(code).unwrap();
            assert!(!r.error && !r.warn, "{} should be a plain return", code);
        }
    }
}
