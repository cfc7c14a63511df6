use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::{STATION_COLUMNS, STATUS_COLUMNS, StationRecord, StatusRecord};

const SUCCESS_RESULT_CODE: &str = "00";

const RESULT_CODE_KEYS: &[&str] = &["resultCode"];
const RESULT_MSG_KEYS: &[&str] = &["resultMsg"];
const TOTAL_COUNT_KEYS: &[&str] = &["totalCount"];
const ITEMS_KEYS: &[&str] = &["items"];
const ITEM_KEYS: &[&str] = &["item"];

/// One decoded page: its rows plus the size of the whole remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total_count: u64,
}

pub type InfoPage = Page<StationRecord>;
pub type StatusPage = Page<StatusRecord>;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("payload must be a JSON object")]
    InvalidPayloadType,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {field} has an unexpected value: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("record {index} is missing required field {field}")]
    MissingRecordField { index: usize, field: &'static str },
    #[error("service returned result code {code}: {message}")]
    ResultCode { code: String, message: String },
}

pub fn parse_info_page(payload: &Value) -> Result<InfoPage, ParseError> {
    parse_page(payload, |index, item| {
        let mut record = StationRecord::default();
        for column in STATION_COLUMNS {
            record.set_column(column, find_text(item, column));
        }
        require_key(index, &record.station_id, &record.charger_id)?;
        Ok(record)
    })
}

pub fn parse_status_page(payload: &Value) -> Result<StatusPage, ParseError> {
    parse_page(payload, |index, item| {
        let mut record = StatusRecord::default();
        for column in STATUS_COLUMNS {
            record.set_column(column, find_text(item, column));
        }
        require_key(index, &record.station_id, &record.charger_id)?;
        Ok(record)
    })
}

fn parse_page<T>(
    payload: &Value,
    decode: impl Fn(usize, &Map<String, Value>) -> Result<T, ParseError>,
) -> Result<Page<T>, ParseError> {
    let root = payload.as_object().ok_or(ParseError::InvalidPayloadType)?;
    let (header, body) = split_envelope(root);

    if let Some(code) = find_value(header, RESULT_CODE_KEYS).and_then(value_text)
        && code != SUCCESS_RESULT_CODE
    {
        let message = find_value(header, RESULT_MSG_KEYS)
            .and_then(value_text)
            .unwrap_or_default();
        return Err(ParseError::ResultCode { code, message });
    }

    let total_raw = find_value(body, TOTAL_COUNT_KEYS)
        .and_then(value_text)
        .ok_or(ParseError::MissingField("totalCount"))?;
    let total_count = total_raw
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidField {
            field: "totalCount",
            value: total_raw.clone(),
        })?;

    let records = item_objects(body)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| decode(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        records,
        total_count,
    })
}

/// Accepts the flat document as well as the `response.header` / `response.body` nesting.
fn split_envelope(root: &Map<String, Value>) -> (&Map<String, Value>, &Map<String, Value>) {
    let Some(response) = find_value(root, &["response"]).and_then(Value::as_object) else {
        return (root, root);
    };

    let header = find_value(response, &["header"])
        .and_then(Value::as_object)
        .unwrap_or(response);
    let body = find_value(response, &["body"])
        .and_then(Value::as_object)
        .unwrap_or(response);
    (header, body)
}

fn item_objects(body: &Map<String, Value>) -> Result<Vec<&Map<String, Value>>, ParseError> {
    let items = match find_value(body, ITEMS_KEYS) {
        Some(value) => value,
        None => return Err(ParseError::MissingField("items")),
    };

    let list = match items {
        // An empty page can come back as `"items": ""` or `null`.
        Value::Null => return Ok(Vec::new()),
        Value::String(text) if text.trim().is_empty() => return Ok(Vec::new()),
        Value::Object(object) => match find_value(object, ITEM_KEYS) {
            Some(inner) => inner,
            None => return Ok(Vec::new()),
        },
        other => other,
    };

    match list {
        Value::Array(values) => values
            .iter()
            .map(|value| value.as_object().ok_or(ParseError::InvalidPayloadType))
            .collect(),
        Value::Object(object) => Ok(vec![object]),
        _ => Err(ParseError::InvalidField {
            field: "items",
            value: list.to_string(),
        }),
    }
}

fn require_key(index: usize, station_id: &str, charger_id: &str) -> Result<(), ParseError> {
    if station_id.is_empty() {
        return Err(ParseError::MissingRecordField {
            index,
            field: "statId",
        });
    }
    if charger_id.is_empty() {
        return Err(ParseError::MissingRecordField {
            index,
            field: "chgerId",
        });
    }
    Ok(())
}

fn find_text(object: &Map<String, Value>, column: &str) -> String {
    find_value(object, &[column])
        .and_then(value_text)
        .unwrap_or_default()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn find_value<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        if let Some(value) = object.get(*alias) {
            return Some(value);
        }
    }

    let normalized_aliases: Vec<String> =
        aliases.iter().map(|alias| normalize_key(alias)).collect();

    object.iter().find_map(|(key, value)| {
        let normalized_key = normalize_key(key);
        if normalized_aliases
            .iter()
            .any(|alias| alias == &normalized_key)
        {
            Some(value)
        } else {
            None
        }
    })
}

fn normalize_key(input: &str) -> String {
    input
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ParseError, parse_info_page, parse_status_page};

    #[test]
    fn parses_flat_info_page() {
        let payload = json!({
            "resultCode": "00",
            "resultMsg": "NORMAL SERVICE.",
            "totalCount": 18001,
            "pageNo": 1,
            "numOfRows": 2,
            "items": {
                "item": [
                    {
                        "statNm": "Gangnam Station",
                        "statId": "ME000001",
                        "chgerId": "01",
                        "chgerType": "04",
                        "addr": "Seoul Gangnam-gu 1",
                        "stat": "2",
                        "statUpdDt": "20260220101500",
                        "output": 50,
                        "parkingFree": "Y"
                    },
                    {
                        "statNm": "Gangnam Station",
                        "statId": "ME000001",
                        "chgerId": "02",
                        "stat": "3"
                    }
                ]
            }
        });

        let page = parse_info_page(&payload).expect("page should parse");

        assert_eq!(page.total_count, 18_001);
        assert_eq!(page.records.len(), 2);
        let first = &page.records[0];
        assert_eq!(first.station_name, "Gangnam Station");
        assert_eq!(first.station_id, "ME000001");
        assert_eq!(first.charger_type, "04");
        assert_eq!(first.status_updated_at, "20260220101500");
        assert_eq!(first.output_kw, "50");
        assert_eq!(first.parking_free, "Y");
        assert_eq!(first.note, "");
        assert_eq!(page.records[1].charger_id, "02");
        assert_eq!(page.records[1].address, "");
    }

    #[test]
    fn accepts_nested_envelope_and_single_item() {
        let payload = json!({
            "response": {
                "header": { "resultCode": "00", "resultMsg": "NORMAL SERVICE." },
                "body": {
                    "totalCount": "1",
                    "items": { "item": { "statid": "ME1", "chgerid": "01", "stat": "2" } }
                }
            }
        });

        let page = parse_status_page(&payload).expect("page should parse");

        assert_eq!(page.total_count, 1);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].station_id, "ME1");
        assert_eq!(page.records[0].status, "2");
    }

    #[test]
    fn treats_empty_items_as_empty_page() {
        let payload = json!({ "resultCode": "00", "totalCount": 0, "items": "" });

        let page = parse_info_page(&payload).expect("page should parse");

        assert_eq!(page.total_count, 0);
        assert!(page.records.is_empty());
    }

    #[test]
    fn rejects_missing_total_count() {
        let payload = json!({ "items": { "item": [] } });

        assert_eq!(
            parse_info_page(&payload),
            Err(ParseError::MissingField("totalCount"))
        );
    }

    #[test]
    fn rejects_record_without_charger_id() {
        let payload = json!({
            "totalCount": 2,
            "items": { "item": [
                { "statId": "ME1", "chgerId": "01" },
                { "statId": "ME1" }
            ] }
        });

        assert_eq!(
            parse_status_page(&payload),
            Err(ParseError::MissingRecordField {
                index: 1,
                field: "chgerId",
            })
        );
    }

    #[test]
    fn surfaces_service_result_code() {
        let payload = json!({
            "resultCode": "30",
            "resultMsg": "SERVICE_KEY_IS_NOT_REGISTERED_ERROR",
            "totalCount": 0,
            "items": ""
        });

        let err = parse_info_page(&payload).expect_err("non-success code must fail");
        assert_eq!(
            err.to_string(),
            "service returned result code 30: SERVICE_KEY_IS_NOT_REGISTERED_ERROR"
        );
    }

    #[test]
    fn rejects_non_object_payload() {
        assert_eq!(
            parse_info_page(&json!([1, 2, 3])),
            Err(ParseError::InvalidPayloadType)
        );
    }
}
