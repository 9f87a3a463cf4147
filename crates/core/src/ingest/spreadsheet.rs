use crate::domain::dataset::{CellValue, PortfolioDataset};
use crate::error::{PipelineError, Result};
use calamine::{open_workbook_auto, Data, ExcelDateTime, Reader};
use chrono::Timelike;
use std::path::{Path, PathBuf};

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];
const NEWS_MARKER: &str = "news";

/// Everything one orchestration run reads from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestedInputs {
    pub portfolios: Vec<PortfolioDataset>,
    pub news: String,
}

pub fn is_spreadsheet(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|wanted| ext.eq_ignore_ascii_case(wanted))
        })
        .unwrap_or(false)
}

pub fn is_news_file(file_name: &str) -> bool {
    file_name.to_lowercase().contains(NEWS_MARKER)
}

/// Spreadsheet files directly under `dir`, sorted by file name.
pub fn list_spreadsheets(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ingestion(dir, e))?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::ingestion(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };
        if is_spreadsheet(name) {
            out.push(path);
        }
    }

    out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(out)
}

/// Reads the first worksheet of a workbook. The first row is the header.
pub fn read_dataset(path: &Path) -> Result<PortfolioDataset> {
    let identifier = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut workbook = open_workbook_auto(path).map_err(|e| PipelineError::ingestion(path, e))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| PipelineError::ingestion(path, e))?,
        None => return Err(PipelineError::ingestion(path, "workbook has no worksheets")),
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(PortfolioDataset::new(identifier, Vec::new(), Vec::new()));
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, cell)| header_name(idx, cell))
        .collect();

    let table: Vec<Vec<CellValue>> = rows
        .map(|row| row.iter().map(cell_value).collect::<Vec<_>>())
        .filter(|values| values.iter().any(|v| !v.is_null()))
        .collect();

    tracing::debug!(
        file = %identifier,
        columns = columns.len(),
        rows = table.len(),
        "parsed spreadsheet"
    );

    Ok(PortfolioDataset::from_table(identifier, columns, table))
}

/// Loads portfolio datasets and the news text from `dir`. Files whose name contains "news"
/// are not portfolios; the first of them (by file name) supplies the news text. The first
/// unreadable file aborts the whole load.
pub fn load_inputs_blocking(dir: &Path) -> Result<IngestedInputs> {
    let paths = list_spreadsheets(dir)?;

    let mut portfolios = Vec::new();
    let mut news_path: Option<&PathBuf> = None;
    for path in &paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_news_file(name) {
            if news_path.is_none() {
                news_path = Some(path);
            }
            continue;
        }
        portfolios.push(read_dataset(path)?);
    }

    let news = match news_path {
        Some(path) => read_dataset(path)?.first_column_text(),
        None => String::new(),
    };

    tracing::info!(
        dir = %dir.display(),
        portfolios = portfolios.len(),
        news_file = ?news_path.map(|p| p.display().to_string()),
        news_len = news.len(),
        "ingested spreadsheets"
    );

    Ok(IngestedInputs { portfolios, news })
}

/// Async wrapper: workbook parsing is blocking I/O and runs on the blocking pool.
pub async fn load_inputs(dir: impl Into<PathBuf>) -> Result<IngestedInputs> {
    let dir = dir.into();
    let task_dir = dir.clone();
    tokio::task::spawn_blocking(move || load_inputs_blocking(&task_dir))
        .await
        .map_err(|e| PipelineError::ingestion(&dir, format!("ingestion task failed: {e}")))?
}

fn header_name(idx: usize, cell: &Data) -> String {
    let name = match cell_value(cell) {
        CellValue::Null => String::new(),
        value => value.to_string().trim().to_string(),
    };
    if name.is_empty() {
        format!("Unnamed: {idx}")
    } else {
        name
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) if f.is_nan() => CellValue::Null,
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => CellValue::Text(render_datetime(dt)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Calendar cells render as `YYYY-MM-DD`, with a time part only when one is set. Durations
/// keep their serial value.
fn render_datetime(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(ts) if !dt.is_duration() => {
            if ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 {
                ts.format("%Y-%m-%d").to_string()
            } else {
                ts.format("%Y-%m-%d %H:%M:%S").to_string()
            }
        }
        _ => CellValue::Number(dt.as_f64()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::render_row;
    use rust_xlsxwriter::{ExcelDateTime as XlsxDateTime, Format, Workbook};

    enum Fixture {
        S(&'static str),
        N(f64),
        D(u16, u8, u8),
        Blank,
    }
    use Fixture::{Blank, D, N, S};

    fn write_xlsx(path: &Path, header: &[&str], rows: &[Vec<Fixture>]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in header.iter().enumerate() {
            sheet.write_string(0, col as u16, *name).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32 + 1, c as u16);
                match cell {
                    S(s) => {
                        sheet.write_string(r, c, *s).unwrap();
                    }
                    N(n) => {
                        sheet.write_number(r, c, *n).unwrap();
                    }
                    D(y, m, d) => {
                        let date = XlsxDateTime::from_ymd(*y, *m, *d).unwrap();
                        let format = Format::new().set_num_format("yyyy-mm-dd");
                        sheet.write_datetime_with_format(r, c, &date, &format).unwrap();
                    }
                    Blank => {}
                }
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn recognizes_spreadsheet_extensions_case_insensitively() {
        assert!(is_spreadsheet("alice.xlsx"));
        assert!(is_spreadsheet("BOB.XLS"));
        assert!(!is_spreadsheet("notes.txt"));
        assert!(!is_spreadsheet("xlsx"));
        assert!(is_news_file("Daily_NEWS.xlsx"));
        assert!(!is_news_file("alice.xlsx"));
    }

    #[test]
    fn reads_header_and_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.xlsx");
        write_xlsx(
            &path,
            &["Stock", "Quantity", ""],
            &[
                vec![S("AAPL"), N(10.0), S("core")],
                vec![S("TSLA"), N(2.5), Blank],
            ],
        );

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.identifier, "alice.xlsx");
        assert_eq!(ds.columns, vec!["Stock", "Quantity", "Unnamed: 2"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[0].cells[1], ("Quantity".to_string(), CellValue::Number(10.0)));
        assert_eq!(ds.rows[1].cells[2], ("Unnamed: 2".to_string(), CellValue::Null));
    }

    #[test]
    fn date_cells_render_as_calendar_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erin.xlsx");
        write_xlsx(
            &path,
            &["Stock", "Bought"],
            &[vec![S("AAPL"), D(2024, 1, 15)]],
        );

        let ds = read_dataset(&path).unwrap();
        assert_eq!(
            ds.rows[0].cells[1],
            ("Bought".to_string(), CellValue::Text("2024-01-15".to_string()))
        );
        assert_eq!(render_row(&ds.rows[0]), "Stock: AAPL, Bought: 2024-01-15");
    }

    #[test]
    fn separates_news_from_portfolios_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_xlsx(
            &dir.path().join("b_investor.xlsx"),
            &["Ticker"],
            &[vec![S("MSFT")]],
        );
        write_xlsx(
            &dir.path().join("a_investor.xlsx"),
            &["Ticker"],
            &[vec![S("AAPL")], vec![S("NVDA")]],
        );
        write_xlsx(
            &dir.path().join("market_news.xlsx"),
            &["Headline", "Source"],
            &[
                vec![S("Fed holds rates."), S("wire")],
                vec![Blank, S("wire")],
                vec![S("Chipmakers rally."), Blank],
            ],
        );
        write_xlsx(
            &dir.path().join("old_news.xlsx"),
            &["Headline"],
            &[vec![S("Ignored headline.")]],
        );
        std::fs::write(dir.path().join("readme.txt"), "not a spreadsheet").unwrap();

        let inputs = load_inputs_blocking(dir.path()).unwrap();
        let ids: Vec<_> = inputs
            .portfolios
            .iter()
            .map(|d| d.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["a_investor.xlsx", "b_investor.xlsx"]);
        assert_eq!(inputs.portfolios[0].row_count(), 2);
        assert_eq!(inputs.news, "Fed holds rates. Chipmakers rally.");
    }

    #[test]
    fn missing_news_file_yields_empty_news() {
        let dir = tempfile::tempdir().unwrap();
        write_xlsx(&dir.path().join("carol.xlsx"), &["Ticker"], &[vec![S("IBM")]]);

        let inputs = load_inputs_blocking(dir.path()).unwrap();
        assert_eq!(inputs.portfolios.len(), 1);
        assert_eq!(inputs.news, "");
    }

    #[test]
    fn empty_directory_yields_no_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = load_inputs_blocking(dir.path()).unwrap();
        assert_eq!(inputs, IngestedInputs::default());
    }

    #[test]
    fn missing_directory_is_an_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_inputs_blocking(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion { .. }));
    }

    #[test]
    fn corrupt_workbook_aborts_ingestion() {
        let dir = tempfile::tempdir().unwrap();
        write_xlsx(&dir.path().join("alice.xlsx"), &["Ticker"], &[vec![S("AAPL")]]);
        std::fs::write(dir.path().join("broken.xlsx"), b"definitely not a zip").unwrap();

        let err = load_inputs_blocking(dir.path()).unwrap_err();
        match err {
            PipelineError::Ingestion { path, .. } => assert!(path.ends_with("broken.xlsx")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn async_loader_matches_blocking_loader() {
        let dir = tempfile::tempdir().unwrap();
        write_xlsx(&dir.path().join("dave.xlsx"), &["Ticker"], &[vec![S("AMD")]]);

        let inputs = load_inputs(dir.path()).await.unwrap();
        assert_eq!(inputs, load_inputs_blocking(dir.path()).unwrap());
    }
}
