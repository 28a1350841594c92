use std::collections::BTreeMap;

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Madrid;

use super::{codes::is_success_code, signature::verify};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEncoding {
    /// `Ds_MerchantParameters` blob signed with the order key.
    Signed,
    /// Flat `Ds_*` form fields.
    Legacy,
    /// `procesaNotificacionSIS` SOAP request.
    Soap,
}

/// A payment notification pushed by the gateway, independent of whatever
/// request started the payment.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCallback {
    pub encoding: CallbackEncoding,
    pub fields: BTreeMap<String, String>,
    pub signature: Option<String>,
    /// Exact text the gateway signed.
    pub signed_data: Option<String>,
}

impl GatewayCallback {
    /// Dispatches on the body: SOAP envelopes start with `<`, everything
    /// else is treated as a form.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|_| AppError::BadRequest("Callback body is not UTF-8".to_string()))?;

        if text.trim_start().starts_with('<') {
            return Self::from_soap(text);
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text)
            .map_err(|e| AppError::BadRequest(format!("Malformed callback form: {}", e)))?;
        Self::from_form(pairs)
    }

    pub fn from_form(pairs: Vec<(String, String)>) -> Result<Self> {
        let form: BTreeMap<String, String> = pairs.into_iter().collect();
        let signature = lookup(&form, "Ds_Signature").map(str::to_string);

        let callback = match lookup(&form, "Ds_MerchantParameters") {
            Some(blob) => GatewayCallback {
                encoding: CallbackEncoding::Signed,
                fields: decode_merchant_parameters(blob)?,
                signature,
                signed_data: Some(blob.to_string()),
            },
            None => GatewayCallback {
                encoding: CallbackEncoding::Legacy,
                fields: form
                    .into_iter()
                    .filter(|(k, _)| !k.eq_ignore_ascii_case("Ds_Signature"))
                    .collect(),
                signature,
                signed_data: None,
            },
        };

        callback.require_core_fields()
    }

    pub fn from_soap(body: &str) -> Result<Self> {
        let xml = unescape_xml(body);

        let start = xml
            .find("<Request")
            .ok_or_else(|| AppError::BadRequest("SOAP callback without <Request>".to_string()))?;
        let end = xml[start..]
            .find("</Request>")
            .map(|i| start + i + "</Request>".len())
            .ok_or_else(|| AppError::BadRequest("Unterminated <Request> in SOAP callback".to_string()))?;

        let request = &xml[start..end];
        let signature = element_text(&xml[end..], "Signature").map(str::to_string);

        GatewayCallback {
            encoding: CallbackEncoding::Soap,
            fields: child_elements(request),
            signature,
            signed_data: Some(request.to_string()),
        }
        .require_core_fields()
    }

    fn require_core_fields(self) -> Result<Self> {
        if self.order_id().is_none() || self.response_code().is_none() {
            return Err(AppError::BadRequest("Callback lacks Ds_Order or Ds_Response".to_string()));
        }
        Ok(self)
    }

    /// Case-insensitive field lookup.
    pub fn field(&self, name: &str) -> Option<&str> {
        lookup(&self.fields, name)
    }

    pub fn order_id(&self) -> Option<&str> {
        self.field("Ds_Order")
    }

    pub fn response_code(&self) -> Option<&str> {
        self.field("Ds_Response")
    }

    pub fn merchant_code(&self) -> Option<&str> {
        self.field("Ds_MerchantCode")
    }

    pub fn identifier(&self) -> Option<&str> {
        self.field("Ds_Merchant_Identifier").filter(|s| !s.is_empty())
    }

    pub fn is_soap(&self) -> bool {
        self.encoding == CallbackEncoding::Soap
    }

    pub fn is_success(&self) -> bool {
        self.response_code().map_or(false, is_success_code)
    }

    /// Card expiry (`YYMM`) as the last day of that month.
    pub fn expiry(&self) -> Option<NaiveDate> {
        let raw = self.field("Ds_ExpiryDate")?.trim();
        if raw.len() != 4 || !raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year = 2000 + raw[..2].parse::<i32>().ok()?;
        let month = raw[2..].parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, 1)?
            .checked_add_months(Months::new(1))?
            .pred_opt()
    }

    /// When the gateway says the payment happened. Dates are reported in
    /// Madrid local time.
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        let date = self.field("Ds_Date").or_else(|| self.field("Fecha"))?;
        let hour = self.field("Ds_Hour").or_else(|| self.field("Hora"))?;
        let text = format!("{} {}", date.trim(), hour.trim());

        let naive = NaiveDateTime::parse_from_str(&text, "%d/%m/%Y %H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(&text, "%d/%m/%Y %H:%M:%S"))
            .ok()?;

        Madrid
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Checks the notification signature. Legacy flat forms carry nothing
    /// verifiable and never pass.
    pub fn signature_valid(&self, secret_b64: &str) -> bool {
        match (self.order_id(), self.signed_data.as_deref(), self.signature.as_deref()) {
            (Some(order_id), Some(data), Some(signature)) => verify(secret_b64, order_id, data, signature),
            _ => false,
        }
    }

    /// Decoded fields as stored on the order for audit.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    map.get(name)
        .or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

fn decode_merchant_parameters(blob: &str) -> Result<BTreeMap<String, String>> {
    let blob = blob.trim();
    let bytes = STANDARD
        .decode(blob)
        .or_else(|_| URL_SAFE.decode(blob))
        .or_else(|_| URL_SAFE_NO_PAD.decode(blob))
        .map_err(|e| AppError::BadRequest(format!("Invalid Ds_MerchantParameters: {}", e)))?;

    let json: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::BadRequest(format!("Invalid Ds_MerchantParameters JSON: {}", e)))?;

    Ok(json
        .into_iter()
        .map(|(key, value)| {
            let raw = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let decoded = urlencoding::decode(&raw)
                .map(|s| s.into_owned())
                .unwrap_or(raw);
            (key, decoded)
        })
        .collect())
}

/// SOAP notifications carry the request either HTML-escaped or in CDATA.
fn unescape_xml(body: &str) -> String {
    body.replace("<![CDATA[", "")
        .replace("]]>", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(xml[start..end].trim())
}

/// Leaf elements of `<Request ...>...</Request>`.
fn child_elements(request: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let inner_start = match request.find('>') {
        Some(i) => i + 1,
        None => return fields,
    };
    let mut rest = &request[inner_start..];

    while let Some(open) = rest.find('<') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find('>') else { break };
        let tag = &rest[..close];
        rest = &rest[close + 1..];

        if tag.starts_with('/') || tag.ends_with('/') {
            continue;
        }
        let name = tag.split_whitespace().next().unwrap_or_default().to_string();
        let end_tag = format!("</{}>", name);
        if let Some(end) = rest.find(&end_tag) {
            fields.insert(name, rest[..end].trim().to_string());
            rest = &rest[end + end_tag.len()..];
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::redsys::signature::sign;

    const SECRET: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

    fn signed_form(order: &str, response: &str) -> Vec<(String, String)> {
        let json = format!(
            r#"{{"Ds_Date":"17%2F10%2F2026","Ds_Hour":"10%3A30","Ds_Amount":"1000","Ds_Currency":"978","Ds_Order":"{}","Ds_MerchantCode":"999008881","Ds_Terminal":"1","Ds_Response":"{}","Ds_Merchant_Identifier":"tok-123","Ds_ExpiryDate":"2802"}}"#,
            order, response
        );
        let blob = STANDARD.encode(json);
        let signature = sign(SECRET, order, &blob).unwrap().replace('+', "-").replace('/', "_");
        vec![
            ("Ds_SignatureVersion".to_string(), "HMAC_SHA256_V1".to_string()),
            ("Ds_MerchantParameters".to_string(), blob),
            ("Ds_Signature".to_string(), signature),
        ]
    }

    #[test]
    fn test_signed_form() {
        let cb = GatewayCallback::from_form(signed_form("0000001C1a2b", "0000")).unwrap();
        assert_eq!(cb.encoding, CallbackEncoding::Signed);
        assert_eq!(cb.order_id(), Some("0000001C1a2b"));
        assert_eq!(cb.field("Ds_Date"), Some("17/10/2026"));
        assert!(cb.is_success());
        assert_eq!(cb.identifier(), Some("tok-123"));
        assert_eq!(cb.expiry(), NaiveDate::from_ymd_opt(2028, 2, 29));
        assert!(cb.signature_valid(SECRET));

        // 10:30 in Madrid (CEST) is 08:30 UTC
        let at = cb.reported_at().unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_tampered_signature() {
        let mut form = signed_form("0000001C1a2b", "0000");
        form[2].1 = sign(SECRET, "0000001C1a2c", &form[1].1).unwrap();
        let cb = GatewayCallback::from_form(form).unwrap();
        assert!(!cb.signature_valid(SECRET));
    }

    #[test]
    fn test_parse_urlencoded_body() {
        let body = serde_urlencoded::to_string(signed_form("000000000042", "0190")).unwrap();
        let cb = GatewayCallback::parse(body.as_bytes()).unwrap();
        assert_eq!(cb.order_id(), Some("000000000042"));
        assert!(!cb.is_success());
        assert!(cb.signature_valid(SECRET));
    }

    #[test]
    fn test_legacy_form() {
        let cb = GatewayCallback::parse(
            b"Ds_Date=17%2F10%2F2026&Ds_Hour=10%3A30&Ds_Order=0000001C1a2b&Ds_Response=0000&Ds_MerchantCode=999008881&Ds_Signature=abc",
        )
        .unwrap();
        assert_eq!(cb.encoding, CallbackEncoding::Legacy);
        assert!(cb.is_success());
        assert!(cb.reported_at().is_some());
        assert!(!cb.signature_valid(SECRET));
        assert!(cb.field("Ds_Signature").is_none());
    }

    fn soap_body(escaped: bool) -> (String, String) {
        let request = "<Request Ds_Version='0.0'><Fecha>17/10/2026</Fecha><Hora>10:30</Hora><Ds_Amount>1000</Ds_Amount><Ds_Currency>978</Ds_Currency><Ds_Order>0000001C1a2b</Ds_Order><Ds_MerchantCode>999008881</Ds_MerchantCode><Ds_Terminal>1</Ds_Terminal><Ds_Response>0000</Ds_Response><Ds_Merchant_Identifier>tok-9</Ds_Merchant_Identifier><Ds_ExpiryDate>2612</Ds_ExpiryDate></Request>";
        let signature = sign(SECRET, "0000001C1a2b", request).unwrap();
        let message = format!("<Message>{}<Signature>{}</Signature></Message>", request, signature);
        let payload = if escaped {
            message.replace('<', "&lt;").replace('>', "&gt;")
        } else {
            format!("<![CDATA[{}]]>", message)
        };
        let body = format!(
            "<?xml version='1.0' encoding='UTF-8'?><SOAP-ENV:Envelope><SOAP-ENV:Body><ns1:procesaNotificacionSIS><XML xsi:type=\"xsd:string\">{}</XML></ns1:procesaNotificacionSIS></SOAP-ENV:Body></SOAP-ENV:Envelope>",
            payload
        );
        (body, request.to_string())
    }

    #[test]
    fn test_soap_escaped_and_cdata() {
        for escaped in [true, false] {
            let (body, request) = soap_body(escaped);
            let cb = GatewayCallback::parse(body.as_bytes()).unwrap();
            assert!(cb.is_soap());
            assert_eq!(cb.signed_data.as_deref(), Some(request.as_str()));
            assert_eq!(cb.order_id(), Some("0000001C1a2b"));
            assert_eq!(cb.identifier(), Some("tok-9"));
            assert_eq!(cb.expiry(), NaiveDate::from_ymd_opt(2026, 12, 31));
            assert!(cb.reported_at().is_some());
            assert!(cb.signature_valid(SECRET));
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(GatewayCallback::parse(b"Ds_Order=1").is_err());
        assert!(GatewayCallback::parse(b"<Envelope></Envelope>").is_err());
        assert!(GatewayCallback::parse(&[0xff, 0xfe]).is_err());
    }
}
