//! Report exporters - CSV, JSON, Markdown
//!
//! Every report implements [`ReportData`]; an exporter turns it into text.

/// Renders a report in one output format
pub trait ReportExporter {
    fn export(&self, report: &dyn ReportData) -> String;

    /// File extension, without the dot
    fn extension(&self) -> &'static str;

    fn mime_type(&self) -> &'static str;
}

/// Tabular view of a report
pub trait ReportData {
    fn title(&self) -> &str;

    fn headers(&self) -> Vec<String>;

    /// One entry per header in every row
    fn rows(&self) -> Vec<Vec<String>>;

    /// Totals and other key figures, in display order
    fn summary(&self) -> Vec<(String, String)>;
}

/// Pick an exporter by format name (`csv`, `json`, `md`/`markdown`)
pub fn exporter_for(format: &str) -> Option<Box<dyn ReportExporter>> {
    match format.to_ascii_lowercase().as_str() {
        "csv" => Some(Box::new(CsvExporter::new())),
        "json" => Some(Box::new(JsonExporter::new())),
        "md" | "markdown" => Some(Box::new(MarkdownExporter::new())),
        _ => None,
    }
}

// ============================================================================
// CSV Exporter
// ============================================================================

pub struct CsvExporter {
    delimiter: char,
    include_header: bool,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            delimiter: ',',
            include_header: true,
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn without_header(mut self) -> Self {
        self.include_header = false;
        self
    }

    fn escape(&self, field: &str) -> String {
        if field.contains(self.delimiter) || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn line(&self, fields: &[String]) -> String {
        let escaped: Vec<String> = fields.iter().map(|f| self.escape(f)).collect();
        let mut line = escaped.join(&self.delimiter.to_string());
        line.push('\n');
        line
    }
}

impl ReportExporter for CsvExporter {
    fn export(&self, report: &dyn ReportData) -> String {
        let mut output = String::new();

        if self.include_header {
            output.push_str(&self.line(&report.headers()));
        }
        for row in report.rows() {
            output.push_str(&self.line(&row));
        }

        output
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn mime_type(&self) -> &'static str {
        "text/csv"
    }
}

// ============================================================================
// JSON Exporter
// ============================================================================

pub struct JsonExporter {
    pretty: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &dyn ReportData) -> String {
        let headers = report.headers();

        let rows: Vec<serde_json::Value> = report
            .rows()
            .into_iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = headers
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(serde_json::Value::String))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();

        let summary: serde_json::Map<String, serde_json::Value> = report
            .summary()
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let output = serde_json::json!({
            "title": report.title(),
            "summary": summary,
            "data": rows,
        });

        if self.pretty {
            serde_json::to_string_pretty(&output).unwrap_or_default()
        } else {
            serde_json::to_string(&output).unwrap_or_default()
        }
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn mime_type(&self) -> &'static str {
        "application/json"
    }
}

// ============================================================================
// Markdown Exporter
// ============================================================================

pub struct MarkdownExporter {
    include_summary: bool,
}

impl Default for MarkdownExporter {
    fn default() -> Self {
        Self {
            include_summary: true,
        }
    }
}

impl MarkdownExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_summary(mut self) -> Self {
        self.include_summary = false;
        self
    }
}

impl ReportExporter for MarkdownExporter {
    fn export(&self, report: &dyn ReportData) -> String {
        let mut output = format!("# {}\n\n", report.title());

        if self.include_summary {
            output.push_str("## Summary\n\n");
            for (key, value) in report.summary() {
                output.push_str(&format!("- **{}**: {}\n", key, value));
            }
            output.push('\n');
        }

        output.push_str("## Data\n\n");

        let headers = report.headers();
        if headers.is_empty() {
            return output;
        }

        output.push_str(&format!("| {} |\n", headers.join(" | ")));
        output.push_str(&format!(
            "| {} |\n",
            headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
        ));
        for row in report.rows() {
            // Pipes inside a cell would split the column
            let cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }

        output
    }

    fn extension(&self) -> &'static str {
        "md"
    }

    fn mime_type(&self) -> &'static str {
        "text/markdown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Contributions;

    impl ReportData for Contributions {
        fn title(&self) -> &str {
            "Contributions"
        }

        fn headers(&self) -> Vec<String> {
            vec!["Member".to_string(), "Amount".to_string(), "Note".to_string()]
        }

        fn rows(&self) -> Vec<Vec<String>> {
            vec![
                vec!["MEM_0002".to_string(), "100.00".to_string(), "share capital".to_string()],
                vec![
                    "MEM_0003".to_string(),
                    "50.00".to_string(),
                    "monthly, \"June\" | late".to_string(),
                ],
            ]
        }

        fn summary(&self) -> Vec<(String, String)> {
            vec![("Total".to_string(), "150.00 KES".to_string())]
        }
    }

    #[test]
    fn test_csv_exporter() {
        let exporter = CsvExporter::new();
        let output = exporter.export(&Contributions);

        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("Member,Amount,Note"));
        assert_eq!(lines.next(), Some("MEM_0002,100.00,share capital"));
        assert_eq!(
            lines.next(),
            Some("MEM_0003,50.00,\"monthly, \"\"June\"\" | late\"")
        );
        assert_eq!(exporter.extension(), "csv");
    }

    #[test]
    fn test_csv_delimiter_and_no_header() {
        let output = CsvExporter::new()
            .with_delimiter(';')
            .without_header()
            .export(&Contributions);

        assert!(!output.contains("Member"));
        assert!(output.starts_with("MEM_0002;100.00;share capital\n"));
    }

    #[test]
    fn test_json_exporter() {
        let output = JsonExporter::new().compact().export(&Contributions);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["title"], "Contributions");
        assert_eq!(value["summary"]["Total"], "150.00 KES");
        assert_eq!(value["data"][0]["Member"], "MEM_0002");
        assert_eq!(value["data"][1]["Amount"], "50.00");
        assert!(!output.contains('\n'));
    }

    #[test]
    fn test_markdown_exporter() {
        let output = MarkdownExporter::new().export(&Contributions);

        assert!(output.starts_with("# Contributions\n"));
        assert!(output.contains("- **Total**: 150.00 KES"));
        assert!(output.contains("| Member | Amount | Note |"));
        assert!(output.contains("| --- | --- | --- |"));
        assert!(output.contains("monthly, \"June\" \\| late"));

        let bare = MarkdownExporter::new().without_summary().export(&Contributions);
        assert!(!bare.contains("## Summary"));
    }

    #[test]
    fn test_exporter_for() {
        assert_eq!(exporter_for("CSV").unwrap().extension(), "csv");
        assert_eq!(exporter_for("markdown").unwrap().extension(), "md");
        assert_eq!(exporter_for("json").unwrap().mime_type(), "application/json");
        assert!(exporter_for("xlsx").is_none());
    }
}
