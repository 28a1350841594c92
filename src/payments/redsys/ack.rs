use super::signature::sign;
use crate::error::Result;

/// Body returned to the gateway after a notification. The gateway keeps
/// retrying until it reads `OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAck {
    Plain(&'static str),
    Soap(String),
}

impl CallbackAck {
    pub fn body(&self) -> &str {
        match self {
            CallbackAck::Plain(s) => s,
            CallbackAck::Soap(s) => s,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            CallbackAck::Plain(_) => "text/plain; charset=utf-8",
            CallbackAck::Soap(_) => "text/xml; charset=utf-8",
        }
    }
}

pub fn plain_ack(paid: bool) -> CallbackAck {
    CallbackAck::Plain(if paid { "OK" } else { "KO" })
}

/// Signed `<Response>` wrapped in the `procesaNotificacionSIS` envelope.
pub fn soap_ack(secret_b64: &str, merchant_order_id: &str, paid: bool) -> Result<CallbackAck> {
    let response = format!(
        "<Response Ds_Version='0.0'><Ds_Response_Merchant>{}</Ds_Response_Merchant></Response>",
        if paid { "OK" } else { "KO" }
    );
    let signature = sign(secret_b64, merchant_order_id, &response)?;
    let message = format!("<Message>{}<Signature>{}</Signature></Message>", response, signature);

    let mut soap = String::new();
    soap.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
    soap.push_str("<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\">\n");
    soap.push_str("<SOAP-ENV:Body>\n");
    soap.push_str("<ns1:procesaNotificacionSIS xmlns:ns1=\"InotificacionSIS\" SOAP-ENV:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\n");
    soap.push_str("<return xsi:type=\"xsd:string\">");
    soap.push_str(&escape_html(&message));
    soap.push_str("</return>\n</ns1:procesaNotificacionSIS>\n</SOAP-ENV:Body>\n</SOAP-ENV:Envelope>");

    Ok(CallbackAck::Soap(soap))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
