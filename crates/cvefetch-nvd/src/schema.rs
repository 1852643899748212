//! CVE API 2.0 response envelope.
//!
//! Only the pagination fields are typed. Records are kept as raw JSON and
//! written through unchanged.

use cvefetch_core::FetchError;
use serde::Deserialize;
use serde_json::Value;

/// Top-level response object of `/rest/json/cves/2.0`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub results_per_page: Option<u64>,
    pub start_index: Option<u64>,
    pub total_results: u64,
    pub vulnerabilities: Vec<Value>,
    pub format: Option<String>,
    pub version: Option<String>,
    pub timestamp: Option<String>,
}

/// Parsed page: records in API order plus the reported total
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub records: Vec<Value>,
    pub total_available: u64,
}

impl PageResult {
    pub fn returned_count(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Decode a response body requested at `offset`.
///
/// Missing or mistyped `totalResults` / `vulnerabilities`, a `startIndex`
/// other than `offset`, non-object records, or more records than the reported
/// total are all [`FetchError::MalformedResponse`].
pub fn parse_page(body: &[u8], offset: u64) -> Result<PageResult, FetchError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| FetchError::malformed(format!("invalid response envelope: {e}")))?;

    if let Some(start) = envelope.start_index {
        if start != offset {
            return Err(FetchError::malformed(format!(
                "startIndex {start} does not match requested offset {offset}"
            )));
        }
    }
    if let Some(pos) = envelope.vulnerabilities.iter().position(|v| !v.is_object()) {
        return Err(FetchError::malformed(format!(
            "vulnerabilities[{pos}] is not an object"
        )));
    }

    let returned = envelope.vulnerabilities.len() as u64;
    if returned > envelope.total_results {
        return Err(FetchError::malformed(format!(
            "page holds {returned} records but totalResults is {}",
            envelope.total_results
        )));
    }

    Ok(PageResult {
        records: envelope.vulnerabilities,
        total_available: envelope.total_results,
    })
}

/// `cve.id` of a raw record, used for logging only
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("cve")?.get("id")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvefetch_core::ErrorKind;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn parses_valid_page() {
        let page = parse_page(
            &body(json!({
                "resultsPerPage": 2,
                "startIndex": 0,
                "totalResults": 5,
                "format": "NVD_CVE",
                "version": "2.0",
                "timestamp": "2024-06-01T00:00:00.000",
                "vulnerabilities": [
                    {"cve": {"id": "CVE-2024-0001"}},
                    {"cve": {"id": "CVE-2024-0002"}}
                ]
            })),
            0,
        )
        .unwrap();
        assert_eq!(page.total_available, 5);
        assert_eq!(page.returned_count(), 2);
        assert_eq!(record_id(&page.records[1]), Some("CVE-2024-0002"));
    }

    #[test]
    fn start_index_is_optional() {
        let page = parse_page(
            &body(json!({"totalResults": 0, "vulnerabilities": []})),
            0,
        )
        .unwrap();
        assert_eq!(page.total_available, 0);
        assert!(page.records.is_empty());
    }

    #[test]
    fn records_pass_through_unchanged() {
        let record = json!({
            "cve": {
                "id": "CVE-2024-1234",
                "metrics": {"cvssMetricV31": [{"cvssData": {"baseScore": 9.8}}]},
                "unknownField": [1, 2, 3]
            }
        });
        let page = parse_page(
            &body(json!({"totalResults": 1, "vulnerabilities": [record.clone()]})),
            0,
        )
        .unwrap();
        assert_eq!(page.records[0], record);
    }

    #[test]
    fn malformed_envelopes() {
        let cases = [
            json!({"vulnerabilities": []}),
            json!({"totalResults": "12", "vulnerabilities": []}),
            json!({"totalResults": -1, "vulnerabilities": []}),
            json!({"totalResults": 3}),
            json!({"totalResults": 3, "vulnerabilities": {"cve": {}}}),
            json!({"totalResults": 3, "vulnerabilities": [1, 2]}),
            json!({"totalResults": 1, "vulnerabilities": [{}, {}]}),
            json!({"totalResults": 10, "startIndex": 4, "vulnerabilities": []}),
            json!([]),
        ];
        for case in cases {
            let err = parse_page(&body(case.clone()), 0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedResponse, "{case}");
        }
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_page(b"<html>Service Unavailable</html>", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        let err = parse_page(b"", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn record_id_missing() {
        assert_eq!(record_id(&json!({"cve": {}})), None);
        assert_eq!(record_id(&json!({"cve": {"id": 7}})), None);
        assert_eq!(record_id(&json!({})), None);
    }
}
