// 📂 Message Sources - SMS exports reduced to (body, timestamp)
// SMS Backup & Restore XML is the main format; CSV and JSON exports work too

use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::SourceReadError;
use crate::record::RawMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xml,
    Csv,
    Json,
}

impl SourceFormat {
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Xml => "SMS Backup XML",
            SourceFormat::Csv => "CSV export",
            SourceFormat::Json => "JSON export",
        }
    }
}

/// Detect format from the file extension
pub fn detect_format(path: &Path) -> Result<SourceFormat, SourceReadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "xml" => Ok(SourceFormat::Xml),
        "csv" => Ok(SourceFormat::Csv),
        "json" => Ok(SourceFormat::Json),
        _ => Err(SourceReadError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Read a whole export file into messages
pub fn load_messages(path: &Path) -> Result<Vec<RawMessage>, SourceReadError> {
    let format = detect_format(path)?;
    let content = fs::read_to_string(path).map_err(|source| SourceReadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let messages = match format {
        SourceFormat::Xml => parse_xml(&content)?,
        SourceFormat::Csv => parse_csv(content.as_bytes())?,
        SourceFormat::Json => parse_json(&content)?,
    };

    tracing::debug!(
        path = %path.display(),
        format = format.name(),
        count = messages.len(),
        "Loaded messages"
    );

    Ok(messages)
}

// ============================================================================
// XML - <smses><sms body="..." readable_date="..."/></smses>
// ============================================================================

// Backups interleave <mms> with <sms>; collecting them relies on quick-xml's overlapped-lists
#[derive(Debug, Deserialize)]
struct SmsBackup {
    #[serde(rename = "sms", default)]
    messages: Vec<SmsEntry>,
}

#[derive(Debug, Deserialize)]
struct SmsEntry {
    #[serde(rename = "@body", default)]
    body: String,
    #[serde(rename = "@readable_date", default)]
    readable_date: String,
}

pub fn parse_xml(content: &str) -> Result<Vec<RawMessage>, SourceReadError> {
    let backup: SmsBackup = quick_xml::de::from_str(content)?;

    Ok(backup
        .messages
        .into_iter()
        .map(|sms| RawMessage::new(sms.body, sms.readable_date))
        .collect())
}

// ============================================================================
// CSV / JSON - one object or row per message
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExportRow {
    #[serde(default)]
    body: String,
    #[serde(alias = "date", default)]
    readable_date: String,
}

impl From<ExportRow> for RawMessage {
    fn from(row: ExportRow) -> Self {
        RawMessage::new(row.body, row.readable_date)
    }
}

pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RawMessage>, SourceReadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut messages = Vec::new();
    for result in rdr.deserialize() {
        let row: ExportRow = result?;
        messages.push(row.into());
    }

    Ok(messages)
}

pub fn parse_json(content: &str) -> Result<Vec<RawMessage>, SourceReadError> {
    let rows: Vec<ExportRow> = serde_json::from_str(content)?;
    Ok(rows.into_iter().map(RawMessage::from).collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BACKUP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<smses count="3" backup_set="x">
  <sms protocol="0" address="M-Money" date="1715351458724" type="1" body="You have received 2000 RWF from Jane Smith (*********013). Your new balance:2000 RWF." readable_date="10 May 2024 4:30:58 PM" contact_name="(Unknown)" />
  <sms protocol="0" address="M-Money" date="1715351506754" type="1" body="Your payment of 1,000 RWF to Jane Smith 12845 has been completed &amp; confirmed." readable_date="10 May 2024 4:31:46 PM" contact_name="(Unknown)" />
  <sms protocol="0" address="M-Money" date="1715351506755" type="1" readable_date="10 May 2024 4:32:00 PM" />
</smses>"#;

    #[test]
    fn test_parse_xml_backup() {
        let messages = parse_xml(BACKUP).unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].timestamp, "10 May 2024 4:30:58 PM");
        assert!(messages[0].body.starts_with("You have received 2000 RWF"));
        assert!(messages[1].body.ends_with("completed & confirmed."));
        assert_eq!(messages[2].body, "");
    }

    #[test]
    fn test_parse_xml_skips_interleaved_mms() {
        let xml = r#"<smses count="4">
  <sms body="You have received 2000 RWF from Jane Smith (013)." readable_date="1 May 2024" />
  <mms date="1714560000000" msg_box="1">
    <parts><part seq="0" ct="text/plain" text="photo" /></parts>
    <addrs><addr address="0788000000" type="137" /></addrs>
  </mms>
  <sms body="Your payment of 1,000 RWF to Jane Smith 12845 has been completed." readable_date="2 May 2024" />
  <mms date="1714646400000" />
</smses>"#;

        let messages = parse_xml(xml).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].timestamp, "1 May 2024");
        assert_eq!(messages[1].timestamp, "2 May 2024");
        assert!(messages[1].body.starts_with("Your payment of 1,000 RWF"));
    }

    #[test]
    fn test_parse_xml_empty_backup() {
        let messages = parse_xml(r#"<smses count="0"></smses>"#).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_parse_xml_malformed() {
        let result = parse_xml("<smses><sms body=\"unterminated></smses>");
        assert!(matches!(result, Err(SourceReadError::Xml(_))));
    }

    #[test]
    fn test_parse_csv() {
        let csv = "address,body,readable_date\n\
                   M-Money,\"You have received 5,000 RWF from John Doe (0788123456).\",1 May 2024\n\
                   M-Money,Hello,2 May 2024\n";

        let messages = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].body,
            "You have received 5,000 RWF from John Doe (0788123456)."
        );
        assert_eq!(messages[1].timestamp, "2 May 2024");
    }

    #[test]
    fn test_parse_json_with_date_alias() {
        let json = r#"[
            {"body": "Your payment of 2,500 RWF to John Smith", "date": "3 May 2024"},
            {"body": "Hello", "readable_date": "4 May 2024"}
        ]"#;

        let messages = parse_json(json).unwrap();

        assert_eq!(messages[0], RawMessage::new("Your payment of 2,500 RWF to John Smith", "3 May 2024"));
        assert_eq!(messages[1].timestamp, "4 May 2024");
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("sms-2024.XML")).unwrap(), SourceFormat::Xml);
        assert_eq!(detect_format(Path::new("export.csv")).unwrap(), SourceFormat::Csv);
        assert_eq!(detect_format(Path::new("export.json")).unwrap(), SourceFormat::Json);
        assert!(matches!(
            detect_format(Path::new("export.txt")),
            Err(SourceReadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_messages_from_file() {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        file.write_all(BACKUP.as_bytes()).unwrap();

        let messages = load_messages(file.path()).unwrap();
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_load_messages_missing_file() {
        let result = load_messages(Path::new("/nonexistent/backup.xml"));
        assert!(matches!(result, Err(SourceReadError::Io { .. })));
    }
}
