/*!
Read side of the audit trail, as used by the dashboard.

The auditor may still be appending while the trail is read, so the reader
consumes whatever is on disk up to the current end of file and never assumes a
fixed length. A trailing line without its newline is a write in progress and
is skipped like any other unparsable line.
*/

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::TrailError;
use crate::record::AuditRecord;

/// Records read from a trail, sorted by `event_id`
#[derive(Debug, Clone, Default)]
pub struct TrailSnapshot {
    pub records: Vec<AuditRecord>,
    /// Non-blank lines that did not parse as an audit record
    pub skipped_lines: usize,
}

pub fn load_trail(path: &Path) -> Result<TrailSnapshot, TrailError> {
    let file = File::open(path).map_err(|source| TrailError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_trail(BufReader::new(file)).map_err(|source| TrailError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every complete line, skipping the ones that are not audit records.
///
/// The sort is stable: records sharing an `event_id` (different devices) keep
/// their trail order.
pub fn parse_trail<R: BufRead>(mut reader: R) -> std::io::Result<TrailSnapshot> {
    let mut snapshot = TrailSnapshot::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }

        let complete = buf.last() == Some(&b'\n');
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(_) => {
                snapshot.skipped_lines += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match AuditRecord::from_json_line(line) {
            Ok(record) if complete => snapshot.records.push(record),
            _ => snapshot.skipped_lines += 1,
        }
    }

    snapshot.records.sort_by_key(|r| r.event_id);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn line(event_id: u64, device: &str, alerts: &str) -> String {
        format!(
            r#"{{"time_tee":1700000000.25,"event_id":{},"device":"{}","actual_state":"camera_on","reported_state":"camera_on","network_attempt":"https://a","alerts":{}}}"#,
            event_id, device, alerts
        )
    }

    #[test]
    fn test_skips_garbage_and_sorts() {
        let content = format!(
            "{}\nnot json\n\n{}\n{}\n",
            line(3, "camera_1", "[]"),
            line(1, "camera_1", r#"["spoofing"]"#),
            line(1, "camera_2", r#"["masking"]"#),
        );
        let snapshot = parse_trail(Cursor::new(content)).unwrap();

        assert_eq!(snapshot.skipped_lines, 1);
        let keys: Vec<(u64, &str)> = snapshot
            .records
            .iter()
            .map(|r| (r.event_id, r.device.as_str()))
            .collect();
        assert_eq!(keys, vec![(1, "camera_1"), (1, "camera_2"), (3, "camera_1")]);
    }

    #[test]
    fn test_partial_last_line_is_skipped() {
        let full = line(1, "camera_1", "[]");
        let content = format!("{}\n{}", full, &full[..full.len() / 2]);
        let snapshot = parse_trail(Cursor::new(content)).unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.skipped_lines, 1);
    }

    #[test]
    fn test_unknown_tag_is_skipped() {
        let content = format!("{}\n", line(1, "camera_1", r#"["tampering"]"#));
        let snapshot = parse_trail(Cursor::new(content)).unwrap();
        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.skipped_lines, 1);
    }

    #[test]
    fn test_load_trail_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", line(2, "camera_1", r#"["tls_violation"]"#)).unwrap();
        writeln!(file, "{}", line(1, "camera_1", "[]")).unwrap();

        let snapshot = load_trail(file.path()).unwrap();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].event_id, 1);
    }

    #[test]
    fn test_missing_trail_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_trail(&dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, TrailError::Read { .. }));
    }
}
