//! Product list input: `.xlsx` workbooks and JSON / JSON Lines files.
//!
//! Workbooks are read directly from the OOXML package (zip + quick-xml).
//! Only the first worksheet is used. The first non-empty row is the header;
//! columns are located by name, so their order does not matter:
//!
//! | Field | Accepted headers (case-insensitive) |
//! |-------|--------------------------------------|
//! | name | `Наименование`, `name`, `title` |
//! | code | `Артикул`, `code`, `sku` |
//! | category | `Категория`, `category`, `category_path` |
//!
//! JSON input is an array of objects (or one object per line for `.jsonl`)
//! using the same keys.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use category_matcher_core::ProductQuery;
use thiserror::Error;

pub const NAME_KEYS: [&str; 3] = ["наименование", "name", "title"];
pub const CODE_KEYS: [&str; 3] = ["артикул", "code", "sku"];
pub const CATEGORY_KEYS: [&str; 3] = ["категория", "category", "category_path"];

/// Maximum cells read from the worksheet.
const XLSX_MAX_CELLS: usize = 500_000;
/// Worksheet bounds of the OOXML format.
const XLSX_MAX_ROWS: usize = 1_048_576;
const XLSX_MAX_COLS: usize = 16_384;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read workbook: {0}")]
    Xlsx(String),
    #[error("failed to parse JSON input: {0}")]
    Json(String),
    #[error("no column named {0}")]
    MissingColumn(&'static str),
    #[error("input contains no product rows")]
    NoRows,
}

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Xlsx,
    Json,
    JsonLines,
}

impl InputFormat {
    /// Pick the format from the file extension, falling back to sniffing the
    /// first bytes when the name has no known extension.
    pub fn detect(filename: &str, bytes: &[u8]) -> Result<Self, SheetError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx") => return Ok(InputFormat::Xlsx),
            Some("json") => return Ok(InputFormat::Json),
            Some("jsonl") | Some("ndjson") => return Ok(InputFormat::JsonLines),
            Some("xls") | Some("csv") => {
                return Err(SheetError::UnsupportedFormat(filename.to_string()))
            }
            _ => {}
        }

        if bytes.starts_with(b"PK") {
            return Ok(InputFormat::Xlsx);
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') => Ok(InputFormat::Json),
            Some(b'{') => Ok(InputFormat::JsonLines),
            _ => Err(SheetError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// One input row. Missing cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    pub name: String,
    pub code: String,
    pub category: String,
}

impl SourceRow {
    pub fn to_query(&self) -> ProductQuery {
        ProductQuery::new(self.name.clone(), self.code.clone())
    }

    /// Pick fields out of a JSON object by their accepted keys.
    pub fn from_object(obj: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            name: lookup(obj, &NAME_KEYS),
            code: lookup(obj, &CODE_KEYS),
            category: lookup(obj, &CATEGORY_KEYS),
        }
    }
}

fn lookup(obj: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> String {
    for (key, value) in obj {
        let key = key.trim().to_lowercase();
        if keys.contains(&key.as_str()) {
            let text = match value {
                serde_json::Value::String(s) => s.trim().to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Read product rows from an in-memory file.
pub fn read_rows(filename: &str, bytes: &[u8]) -> Result<Vec<SourceRow>, SheetError> {
    let rows = match InputFormat::detect(filename, bytes)? {
        InputFormat::Xlsx => read_xlsx_rows(bytes)?,
        InputFormat::Json => read_json_rows(bytes)?,
        InputFormat::JsonLines => read_jsonl_rows(bytes)?,
    };
    if rows.is_empty() {
        return Err(SheetError::NoRows);
    }
    Ok(rows)
}

/// Read product rows from a file on disk.
pub fn read_rows_from_path(path: &Path) -> anyhow::Result<Vec<SourceRow>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path.to_string_lossy();
    read_rows(&filename, &bytes).with_context(|| format!("Failed to load {}", path.display()))
}

// ============ JSON ============

fn read_json_rows(bytes: &[u8]) -> Result<Vec<SourceRow>, SheetError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| SheetError::Json(e.to_string()))?;
    let items = value
        .as_array()
        .ok_or_else(|| SheetError::Json("expected an array of objects".to_string()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object()
                .map(SourceRow::from_object)
                .ok_or_else(|| SheetError::Json(format!("item {} is not an object", i)))
        })
        .collect()
}

fn read_jsonl_rows(bytes: &[u8]) -> Result<Vec<SourceRow>, SheetError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SheetError::Json(e.to_string()))?;
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| SheetError::Json(format!("line {}: {}", i + 1, e)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| SheetError::Json(format!("line {} is not an object", i + 1)))?;
        rows.push(SourceRow::from_object(obj));
    }
    Ok(rows)
}

// ============ XLSX ============

fn read_xlsx_rows(bytes: &[u8]) -> Result<Vec<SourceRow>, SheetError> {
    let sheet = read_first_sheet(bytes)?;
    let mut rows = sheet
        .into_values()
        .filter(|r| r.values().any(|c| !c.trim().is_empty()));

    let header = match rows.next() {
        Some(h) => h,
        None => return Ok(Vec::new()),
    };
    let find = |keys: &[&str]| {
        header
            .iter()
            .find(|(_, h)| keys.contains(&h.trim().to_lowercase().as_str()))
            .map(|(&col, _)| col)
    };
    let name_col = find(&NAME_KEYS).ok_or(SheetError::MissingColumn("Наименование"))?;
    let code_col = find(&CODE_KEYS);
    let category_col = find(&CATEGORY_KEYS);

    let cell = |row: &SheetRow, col: Option<usize>| {
        col.and_then(|c| row.get(&c))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    Ok(rows
        .map(|row| SourceRow {
            name: cell(&row, Some(name_col)),
            code: cell(&row, code_col),
            category: cell(&row, category_col),
        })
        .collect())
}

/// Non-empty cells of one worksheet row, keyed by zero-based column.
pub type SheetRow = BTreeMap<usize, String>;

/// Read the first worksheet as its non-empty rows, keyed by zero-based row.
pub fn read_first_sheet(bytes: &[u8]) -> Result<BTreeMap<usize, SheetRow>, SheetError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| SheetError::Xlsx(e.to_string()))?;
    let has_shared = archive
        .file_names()
        .any(|n| n == "xl/sharedStrings.xml");
    let shared_strings = if has_shared {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet = list_worksheet_names(&archive)
        .into_iter()
        .next()
        .ok_or_else(|| SheetError::Xlsx("workbook has no worksheets".to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    read_sheet_cells(&xml, &shared_strings)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, SheetError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| SheetError::Xlsx(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| SheetError::Xlsx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(SheetError::Xlsx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Shared string table. Rich-text runs inside one `<si>` are concatenated.
fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, SheetError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = current.is_some(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(SheetError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Zero-based column index from a cell reference such as `"AB12"`.
///
/// `None` when the reference has no letters or the column does not fit in a `usize`.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: Vec<u8> = cell_ref
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for b in letters {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

fn out_of_bounds(what: &str, cell_ref: &str) -> SheetError {
    SheetError::Xlsx(format!("{} reference {} is outside the worksheet", what, cell_ref))
}

#[derive(Clone, Copy, PartialEq)]
enum CellType {
    Shared,
    Inline,
    Other,
}

fn read_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<BTreeMap<usize, SheetRow>, SheetError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut rows: BTreeMap<usize, SheetRow> = BTreeMap::new();
    let mut cell_count = 0usize;
    let mut row_idx: Option<usize> = None;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut col_idx = 0usize;
    let mut cell_type = CellType::Other;
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    let idx = match attr(&e, b"r") {
                        Some(r) => match r.trim().parse::<usize>() {
                            Ok(n) if (1..=XLSX_MAX_ROWS).contains(&n) => n - 1,
                            _ => return Err(out_of_bounds("row", &r)),
                        },
                        None => next_row,
                    };
                    if idx >= XLSX_MAX_ROWS {
                        return Err(out_of_bounds("row", &(idx + 1).to_string()));
                    }
                    row_idx = Some(idx);
                    next_row = idx + 1;
                    next_col = 0;
                }
                b"c" => {
                    col_idx = match attr(&e, b"r") {
                        Some(r) => match column_index(&r) {
                            Some(c) if c < XLSX_MAX_COLS => c,
                            Some(_) => return Err(out_of_bounds("cell", &r)),
                            None if r.bytes().next().is_some_and(|b| b.is_ascii_alphabetic()) => {
                                return Err(out_of_bounds("cell", &r))
                            }
                            None => next_col,
                        },
                        None => next_col,
                    };
                    if col_idx >= XLSX_MAX_COLS {
                        return Err(out_of_bounds("cell", &format!("column {}", col_idx + 1)));
                    }
                    next_col = col_idx + 1;
                    cell_type = match attr(&e, b"t").as_deref() {
                        Some("s") => CellType::Shared,
                        Some("inlineStr") => CellType::Inline,
                        _ => CellType::Other,
                    };
                    value.clear();
                }
                b"v" => in_value = true,
                b"t" if cell_type == CellType::Inline => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                value.push_str(&te.unescape().unwrap_or_default());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let text = match cell_type {
                        CellType::Shared => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default(),
                        _ => value.clone(),
                    };
                    if let Some(r) = row_idx {
                        if !text.is_empty() {
                            if cell_count >= XLSX_MAX_CELLS {
                                return Err(SheetError::Xlsx(format!(
                                    "worksheet exceeds {} cells",
                                    XLSX_MAX_CELLS
                                )));
                            }
                            cell_count += 1;
                            rows.entry(r).or_default().insert(col_idx, text);
                        }
                    }
                    cell_type = CellType::Other;
                }
                b"row" => row_idx = None,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(SheetError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_xlsx(sheet: &str, shared: Option<&str>) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        if let Some(shared) = shared {
            zip.start_file("xl/sharedStrings.xml", options).unwrap();
            zip.write_all(shared.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<si><t>Артикул</t></si>
<si><t>Наименование</t></si>
<si><r><t>Генератор </t></r><r><t>бензиновый</t></r></si>
</sst>"#;

    #[test]
    fn reads_rows_by_header_names() {
        let sheet = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>1</v></c><c r="B1" t="s"><v>0</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>1001</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>Свеча &amp; колпак</t></is></c><c r="B3" t="inlineStr"><is><t>SP-7</t></is></c></row>
</sheetData></worksheet>"#;
        let bytes = build_xlsx(sheet, Some(SHARED));
        let rows = read_rows("products.xlsx", &bytes).unwrap();
        assert_eq!(
            rows,
            vec![
                SourceRow {
                    name: "Генератор бензиновый".to_string(),
                    code: "1001".to_string(),
                    category: String::new(),
                },
                SourceRow {
                    name: "Свеча & колпак".to_string(),
                    code: "SP-7".to_string(),
                    category: String::new(),
                },
            ]
        );
    }

    #[test]
    fn sparse_cells_keep_their_columns() {
        let sheet = r#"<worksheet><sheetData>
<row r="2"><c r="B2" t="inlineStr"><is><t>name</t></is></c><c r="D2" t="inlineStr"><is><t>category</t></is></c></row>
<row r="3"><c r="B3" t="inlineStr"><is><t>Мотоблок</t></is></c><c r="D3" t="inlineStr"><is><t>Мотоблоки</t></is></c></row>
<row r="5"><c r="D5" t="inlineStr"><is><t>Сироты</t></is></c></row>
</sheetData></worksheet>"#;
        let rows = read_rows("in.xlsx", &build_xlsx(sheet, None)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Мотоблок");
        assert_eq!(rows[0].category, "Мотоблоки");
        assert_eq!(rows[1].name, "");
    }

    #[test]
    fn missing_name_column_is_error() {
        let sheet = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>sku</t></is></c></row>
<row r="2"><c r="A2"><v>5</v></c></row>
</sheetData></worksheet>"#;
        let err = read_rows("in.xlsx", &build_xlsx(sheet, None)).unwrap_err();
        assert!(matches!(err, SheetError::MissingColumn(_)));
    }

    #[test]
    fn header_only_workbook_has_no_rows() {
        let sheet = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c></row>
</sheetData></worksheet>"#;
        let err = read_rows("in.xlsx", &build_xlsx(sheet, None)).unwrap_err();
        assert!(matches!(err, SheetError::NoRows));
    }

    #[test]
    fn column_references() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("XFD1"), Some(16_383));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index("ZZZZZZZZZZZZZZZZZZZZ1"), None);
    }

    fn header_and_cell(cell: &str) -> String {
        format!(
            r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c></row>
{}
</sheetData></worksheet>"#,
            cell
        )
    }

    #[test]
    fn huge_row_reference_is_rejected() {
        let sheet = header_and_cell(
            r#"<row r="1000000000000000000"><c r="A1000000000000000000" t="inlineStr"><is><t>x</t></is></c></row>"#,
        );
        let err = read_rows("in.xlsx", &build_xlsx(&sheet, None)).unwrap_err();
        assert!(matches!(err, SheetError::Xlsx(_)), "{err}");
    }

    #[test]
    fn overflowing_column_reference_is_rejected() {
        let sheet = header_and_cell(
            r#"<row r="2"><c r="ZZZZZZZZZZZZZZZZZZZZ2" t="inlineStr"><is><t>x</t></is></c></row>"#,
        );
        let err = read_rows("in.xlsx", &build_xlsx(&sheet, None)).unwrap_err();
        assert!(matches!(err, SheetError::Xlsx(_)), "{err}");
    }

    #[test]
    fn column_past_xfd_is_rejected() {
        let sheet = header_and_cell(
            r#"<row r="2"><c r="XFE2" t="inlineStr"><is><t>x</t></is></c></row>"#,
        );
        let err = read_rows("in.xlsx", &build_xlsx(&sheet, None)).unwrap_err();
        assert!(matches!(err, SheetError::Xlsx(_)), "{err}");
    }

    #[test]
    fn distant_cells_within_bounds_are_read_sparsely() {
        let sheet = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c><c r="XFD1" t="inlineStr"><is><t>sku</t></is></c></row>
<row r="1048576"><c r="A1048576" t="inlineStr"><is><t>Фильтр</t></is></c><c r="XFD1048576" t="inlineStr"><is><t>F-9</t></is></c></row>
</sheetData></worksheet>"#;
        let rows = read_rows("in.xlsx", &build_xlsx(sheet, None)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Фильтр");
        assert_eq!(rows[0].code, "F-9");
    }

    #[test]
    fn json_array_accepts_key_aliases() {
        let json = r#"[{"Наименование": "Генератор", "Артикул": 42}, {"title": "Фильтр", "sku": "F-1"}]"#;
        let rows = read_rows("in.json", json.as_bytes()).unwrap();
        assert_eq!(rows[0].name, "Генератор");
        assert_eq!(rows[0].code, "42");
        assert_eq!(rows[1].name, "Фильтр");
        assert_eq!(rows[1].code, "F-1");
    }

    #[test]
    fn jsonl_skips_blank_lines() {
        let text = "{\"name\": \"a\"}\n\n{\"name\": \"b\", \"category\": \"X>Y\"}\n";
        let rows = read_rows("upload", text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].category, "X>Y");
    }

    #[test]
    fn unsupported_inputs_are_rejected() {
        assert!(matches!(
            read_rows("old.xls", b"\xd0\xcf"),
            Err(SheetError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            read_rows("notes", b"hello"),
            Err(SheetError::UnsupportedFormat(_))
        ));
        assert!(matches!(read_rows("broken.xlsx", b"PK not a zip"), Err(SheetError::Xlsx(_))));
    }
}
