use crate::error::SourceError;
use crate::events::LogEvent;
use log::debug;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read one artifact and parse it into events
///
/// The file is read fully and closed before parsing starts.
pub fn parse_artifact(path: &Path) -> Result<Vec<LogEvent>, SourceError> {
    let body = fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_payload(&name, &body)
}

/// Parse an artifact body: a single event object or an array of them
///
/// Array elements that are not objects are skipped.
pub fn parse_payload(artifact: &str, body: &str) -> Result<Vec<LogEvent>, SourceError> {
    let value: Value = serde_json::from_str(body).map_err(|source| SourceError::Parse {
        artifact: artifact.to_string(),
        source,
    })?;

    match value {
        Value::Object(_) => Ok(LogEvent::from_value(&value).into_iter().collect()),
        Value::Array(items) => {
            let events: Vec<LogEvent> = items
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| {
                    let event = LogEvent::from_value(item);
                    if event.is_none() {
                        debug!("Skipping non-object element #{} in {}", idx, artifact);
                    }
                    event
                })
                .collect();
            Ok(events)
        }
        _ => Err(SourceError::UnsupportedPayload(artifact.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_single_object() {
        let events = parse_payload(
            "one.json",
            r#"{"service": "api", "timestamp": 1700000000.0, "message": "HTTP Status Code: 404"}"#,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].service, "api");
        assert_eq!(events[0].status_code(), Some(404));
    }

    #[test]
    fn test_parse_array() {
        let events = parse_payload(
            "many.json",
            r#"[{"service": "a", "message": "x"}, {"service": "b"}, 7, {"message": "y"}]"#,
        )
        .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[1].message, "");
        assert_eq!(events[2].service, "");
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_payload("empty.json", "[]").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = parse_payload("bad.json", "{\"service\": ").unwrap_err();
        assert!(matches!(err, SourceError::Parse { ref artifact, .. } if artifact == "bad.json"));
    }

    #[test]
    fn test_scalar_payload_is_unsupported() {
        let err = parse_payload("scalar.json", "\"hello\"").unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedPayload(_)));
    }

    #[test]
    fn test_parse_artifact_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch_1.json");
        fs::write(&path, r#"[{"service": "monitoring", "message": "HTTP Status Code: 200"}]"#)
            .unwrap();

        let events = parse_artifact(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_success());
    }

    #[test]
    fn test_parse_artifact_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = parse_artifact(&dir.path().join("gone.json")).unwrap_err();
        assert!(matches!(err, SourceError::IoError(_)));
    }
}
