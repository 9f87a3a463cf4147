use crate::domain::dataset::{PortfolioDataset, Row};

/// Closing instruction shared by every prompt.
pub const INSTRUCTION: &str = "Should the investor BUY, SELL, or HOLD? Explain your reasoning, \
then end with an explicit one-word recommendation: BUY, SELL, or HOLD.";

const EMPTY_PORTFOLIO: &str = "(empty portfolio)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Global,
    PerUser,
    PerStock,
    All,
}

/// What a single prompt is about.
#[derive(Debug, Clone, Copy)]
pub enum PromptScope<'a> {
    /// Whole market: news only.
    Global,
    /// One investor's whole portfolio.
    PerUser { dataset: &'a PortfolioDataset },
    /// One position, tagged with its investor.
    PerStock { user: &'a str, row: &'a Row },
    /// One position, tagged with both investor and stock.
    All {
        investor: &'a str,
        stock: &'a str,
        row: &'a Row,
    },
}

impl PromptScope<'_> {
    pub fn granularity(&self) -> Granularity {
        match self {
            PromptScope::Global => Granularity::Global,
            PromptScope::PerUser { .. } => Granularity::PerUser,
            PromptScope::PerStock { .. } => Granularity::PerStock,
            PromptScope::All { .. } => Granularity::All,
        }
    }
}

pub fn build_prompt(scope: PromptScope<'_>, news: &str) -> String {
    let body = match scope {
        PromptScope::Global => {
            format!("Analyze the following news and its impact on the stock market: {news}")
        }
        PromptScope::PerUser { dataset } => format!(
            "Investor portfolio ({}):\n{}\n\nRecent market news: {news}\n\n\
Analyze how this news affects the portfolio as a whole.",
            dataset.identifier,
            render_table(dataset)
        ),
        PromptScope::PerStock { user, row } => format!(
            "Investor {user} holds this position: {}\n\nRecent market news: {news}\n\n\
Analyze how this news affects the position.",
            render_row(row)
        ),
        PromptScope::All {
            investor,
            stock,
            row,
        } => format!(
            "Investor: {investor}\nStock: {stock}\nPosition: {}\n\nRecent market news: {news}\n\n\
Analyze how this news affects this investor's holding in {stock}.",
            render_row(row)
        ),
    };

    format!("{body}\n\n{INSTRUCTION}")
}

/// `column: value` pairs, comma-joined.
pub fn render_row(row: &Row) -> String {
    row.cells
        .iter()
        .map(|(column, value)| format!("{column}: {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whitespace-aligned text table: a header line, then one line per row.
pub fn render_table(dataset: &PortfolioDataset) -> String {
    if dataset.columns.is_empty() {
        return EMPTY_PORTFOLIO.to_string();
    }

    let lines: Vec<Vec<String>> = std::iter::once(dataset.columns.clone())
        .chain(dataset.rows.iter().map(|row| {
            dataset
                .columns
                .iter()
                .enumerate()
                .map(|(idx, _)| {
                    row.cells
                        .get(idx)
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_else(|| "NaN".to_string())
                })
                .collect()
        }))
        .collect();

    let widths: Vec<usize> = (0..dataset.columns.len())
        .map(|col| {
            lines
                .iter()
                .map(|line| line[col].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let last = widths.len() - 1;
    lines
        .iter()
        .map(|line| {
            // The last column is left unpadded so lines carry no trailing filler.
            line.iter()
                .zip(&widths)
                .enumerate()
                .map(|(col, (cell, width))| {
                    if col == last {
                        cell.clone()
                    } else {
                        format!("{cell:<width$}")
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
