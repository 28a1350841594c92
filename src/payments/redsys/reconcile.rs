use std::io::Read;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Outcome of a card order, as looked up in the gateway's back office.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconcileLine {
    pub order_id: i64,
    pub paid: bool,
    #[serde(default)]
    pub response_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub paid: usize,
    pub declined: usize,
    pub failed: Vec<(i64, String)>,
}

/// Reads `order_id,paid,response_code` lines.
pub fn read_reconciliation<R: Read>(reader: R) -> Result<Vec<ReconcileLine>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    csv.deserialize::<ReconcileLine>()
        .map(|line| {
            line.map(|mut l| {
                l.response_code = l.response_code.filter(|c| !c.is_empty());
                l
            })
            .map_err(|e| AppError::BadRequest(format!("Invalid reconciliation line: {}", e)))
        })
        .collect()
}

/// Stored on the order in the shape of a callback answer, so its status
/// text reads the same.
pub fn reconciled_response(code: Option<&str>) -> Option<String> {
    code.map(|code| serde_json::json!({ "Ds_Response": code, "reconciled": true }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reconciliation() {
        let file = "order_id,paid,response_code\n 12 , true , 0000 \n13,false,\n14,false,0190\n";
        let lines = read_reconciliation(file.as_bytes()).unwrap();

        assert_eq!(
            lines,
            vec![
                ReconcileLine { order_id: 12, paid: true, response_code: Some("0000".into()) },
                ReconcileLine { order_id: 13, paid: false, response_code: None },
                ReconcileLine { order_id: 14, paid: false, response_code: Some("0190".into()) },
            ]
        );
    }

    #[test]
    fn test_read_reconciliation_rejects_bad_flag() {
        let file = "order_id,paid,response_code\n12,maybe,\n";
        assert!(matches!(read_reconciliation(file.as_bytes()), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_reconciled_response_carries_code() {
        assert_eq!(reconciled_response(None), None);
        let raw = reconciled_response(Some("0190")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["Ds_Response"], "0190");
    }
}
