/// Text for a gateway response code (`Ds_Response` or a `SIS` error code).
pub fn response_text(code: &str) -> &'static str {
    let code = code.trim();

    match code {
        "SIS0298" => return "Merchant does not allow card-on-file operations",
        "SIS0319" => return "Merchant does not belong to the group in Ds_Merchant_Group",
        "SIS0321" => return "Ds_Merchant_Identifier reference is not associated with the merchant",
        "SIS0322" => return "Ds_Merchant_Group format error",
        "SIS0325" => return "No screens requested but no card reference was sent",
        _ => {}
    }

    match code.parse::<u32>() {
        Ok(0..=99) => "Transaction authorised for payments and pre-authorisations",
        Ok(900) => "Transaction authorised for refunds and confirmations",
        Ok(101) => "Expired card",
        Ok(102) => "Card temporarily blocked or under suspicion of fraud",
        Ok(104) | Ok(9104) => "Operation not allowed for this card or terminal",
        Ok(116) => "Insufficient funds",
        Ok(118) => "Card not registered",
        Ok(129) => "Wrong security code (CVV2/CVC2)",
        Ok(180) => "Card not supported by the service",
        Ok(184) => "Cardholder authentication failed",
        Ok(190) => "Denied without a specific reason",
        Ok(191) => "Wrong expiry date",
        Ok(202) => "Card temporarily blocked or under suspicion of fraud, card withheld",
        Ok(912) | Ok(9912) => "Issuer unavailable",
        _ => "Transaction denied",
    }
}

/// `0000`..`0099` authorise the payment.
pub fn is_success_code(code: &str) -> bool {
    matches!(code.trim().parse::<u32>(), Ok(0..=99))
}
