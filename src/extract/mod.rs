use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

/// Declared types handled by plain-text decoding. Structured formats (json,
/// yaml, csv, html) get their own decoders below.
const PLAIN_TEXT_TYPES: &[&str] = &[
    "txt", "md", "css", "xml", "log", "js", "py", "java", "cpp", "c", "php", "rb", "go", "rs",
    "swift",
];

const CSV_SAMPLE_ROWS: usize = 6;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("script regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {file_type}")]
    UnsupportedType { file_type: String },
    #[error("file content could not be decoded: {reason}")]
    Corrupt { reason: String },
    #[error("file is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
}

/// Turns raw file bytes into text the AI can analyze.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], declared_type: &str) -> Result<String, ExtractError>;
}

/// Extractor for text-based formats. Binary formats (pdf, office documents)
/// are deliberately out: they would need format parsers and the declared-type
/// set in config already excludes them.
pub struct TextExtractor {
    max_bytes: usize,
}

impl TextExtractor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl ContentExtractor for TextExtractor {
    fn extract(&self, bytes: &[u8], declared_type: &str) -> Result<String, ExtractError> {
        if bytes.len() > self.max_bytes {
            return Err(ExtractError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }

        let file_type = declared_type.to_ascii_lowercase();
        match file_type.as_str() {
            "json" => extract_json(bytes),
            "yaml" | "yml" => extract_yaml(bytes),
            "csv" => extract_csv(bytes),
            "html" | "htm" => extract_html(bytes),
            t if PLAIN_TEXT_TYPES.contains(&t) => extract_plain(bytes),
            other => Err(ExtractError::UnsupportedType {
                file_type: other.to_string(),
            }),
        }
    }
}

fn decode(bytes: &[u8]) -> Result<&str, ExtractError> {
    std::str::from_utf8(bytes).map_err(|_| ExtractError::Corrupt {
        reason: "not valid UTF-8".to_string(),
    })
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    let content = decode(bytes)?;
    let lines = content.lines().count();
    let words = content.split_whitespace().count();
    Ok(format!(
        "Text Document Analysis\nLines: {lines}\nWords: {words}\nCharacters: {}\n\nContent:\n{content}",
        content.chars().count()
    ))
}

fn extract_json(bytes: &[u8]) -> Result<String, ExtractError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ExtractError::Corrupt {
        reason: format!("invalid JSON: {e}"),
    })?;

    let structure = match &value {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(12).collect();
            format!("object with {} keys ({})", map.len(), keys.join(", "))
        }
        Value::Array(items) => format!("array with {} items", items.len()),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    };

    let formatted = serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Corrupt {
        reason: format!("could not reformat JSON: {e}"),
    })?;
    Ok(format!(
        "JSON Document Analysis\nStructure: {structure}\n\nFormatted Content:\n{formatted}"
    ))
}

fn extract_yaml(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = decode(bytes)?;
    let value: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(text).map_err(|e| ExtractError::Corrupt {
            reason: format!("invalid YAML: {e}"),
        })?;

    let structure = match &value {
        serde_yaml_ng::Value::Mapping(map) => format!("mapping with {} keys", map.len()),
        serde_yaml_ng::Value::Sequence(items) => format!("sequence with {} items", items.len()),
        _ => "scalar".to_string(),
    };

    let formatted = serde_yaml_ng::to_string(&value).map_err(|e| ExtractError::Corrupt {
        reason: format!("could not reformat YAML: {e}"),
    })?;
    Ok(format!(
        "YAML Document Analysis\nStructure: {structure}\n\nFormatted Content:\n{formatted}"
    ))
}

fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = decode(bytes)?;
    let rows: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if rows.is_empty() {
        return Ok("Empty CSV file".to_string());
    }

    let delimiter = guess_delimiter(rows[0]);
    let headers: Vec<&str> = rows[0].split(delimiter).map(str::trim).collect();

    let mut result = format!(
        "CSV Document Analysis\nColumns: {}\nRows: {}\nHeaders: {}\n\nSample Data:\n",
        headers.len(),
        rows.len().saturating_sub(1),
        headers.join(", ")
    );
    for (i, row) in rows.iter().take(CSV_SAMPLE_ROWS).enumerate() {
        let cells: Vec<&str> = row.split(delimiter).map(str::trim).collect();
        result.push_str(&format!("Row {i}: {}\n", cells.join(", ")));
    }
    if rows.len() > CSV_SAMPLE_ROWS {
        result.push_str(&format!("... and {} more rows", rows.len() - CSV_SAMPLE_ROWS));
    }
    Ok(result)
}

fn guess_delimiter(header: &str) -> char {
    [',', ';', '\t', '|']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .unwrap_or(',')
}

fn extract_html(bytes: &[u8]) -> Result<String, ExtractError> {
    let raw = decode(bytes)?;

    let title = TITLE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| "No title".to_string());

    let without_scripts = SCRIPT_RE.replace_all(raw, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    let text: String = without_tags
        .lines()
        .map(|l| decode_entities(l.trim()))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        "HTML Document Analysis\nTitle: {title}\n\nContent:\n{text}"
    ))
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TextExtractor {
        TextExtractor::new(16 * 1024 * 1024)
    }

    #[test]
    fn plain_text_reports_counts_and_content() {
        let out = extractor().extract(b"hello world\nsecond line", "txt").unwrap();
        assert!(out.contains("Lines: 2"));
        assert!(out.contains("Words: 4"));
        assert!(out.contains("hello world"));
    }

    #[test]
    fn source_files_extract_as_plain_text() {
        let out = extractor()
            .extract(b"fn main() {}\n", "rs")
            .unwrap();
        assert!(out.contains("fn main() {}"));
    }

    #[test]
    fn json_is_pretty_printed_with_structure() {
        let out = extractor()
            .extract(br#"{"name":"ada","tags":[1,2]}"#, "json")
            .unwrap();
        assert!(out.contains("object with 2 keys"));
        assert!(out.contains("\"name\": \"ada\""));
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let err = extractor().extract(b"{not json", "json").unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt { .. }));
    }

    #[test]
    fn yaml_reports_mapping_structure() {
        let out = extractor().extract(b"a: 1\nb: 2\n", "yaml").unwrap();
        assert!(out.contains("mapping with 2 keys"));
    }

    #[test]
    fn invalid_yaml_is_corrupt() {
        let err = extractor().extract(b"a: [unclosed", "yml").unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt { .. }));
    }

    #[test]
    fn csv_preview_guesses_delimiter() {
        let out = extractor()
            .extract(b"name;age\nada;36\ngrace;45\n", "csv")
            .unwrap();
        assert!(out.contains("Columns: 2"));
        assert!(out.contains("Rows: 2"));
        assert!(out.contains("Headers: name, age"));
        assert!(out.contains("Row 1: ada, 36"));
    }

    #[test]
    fn long_csv_is_sampled() {
        let mut data = String::from("a,b\n");
        for i in 0..20 {
            data.push_str(&format!("{i},{i}\n"));
        }
        let out = extractor().extract(data.as_bytes(), "csv").unwrap();
        assert!(out.contains("... and 15 more rows"));
    }

    #[test]
    fn html_strips_tags_and_scripts() {
        let html = b"<html><head><title>Docs</title><script>alert(1)</script></head>\
                     <body><p>Hello &amp; welcome</p></body></html>";
        let out = extractor().extract(html, "html").unwrap();
        assert!(out.contains("Title: Docs"));
        assert!(out.contains("Hello & welcome"));
        assert!(!out.contains("alert"));
        assert!(!out.contains("<p>"));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let err = extractor().extract(b"%PDF-1.4", "pdf").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType { file_type } if file_type == "pdf"));
    }

    #[test]
    fn oversized_input_is_rejected_before_decoding() {
        let small = TextExtractor::new(8);
        let err = small.extract(b"0123456789", "txt").unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 10, max: 8 }));
    }

    #[test]
    fn invalid_utf8_is_corrupt() {
        let err = extractor().extract(&[0xff, 0xfe, 0x00], "txt").unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt { .. }));
    }
}
