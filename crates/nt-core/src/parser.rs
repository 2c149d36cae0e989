//! Extraction of a diary day from the source site's markup.
//!
//! Everything that knows about the page layout lives in this module. The rest
//! of the pipeline only sees [`parse_diary`] and its [`ParseError`].

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::diary::{DiaryEntry, Product, Totals};

/// Headline texts shown instead of the diary when the session is not logged in.
const LOGIN_MARKERS: [&str; 2] = ["Anmelden", "Log in"];

/// Inline color of the decorative rows separating meal categories.
const SEPARATOR_COLOR: &str = "color:#5f5f5f";

const NAME_COLUMN: usize = 0;
const CALORIES_COLUMN: usize = 2;
const FAT_COLUMN: usize = 3;
const CARBS_COLUMN: usize = 4;
const PROTEIN_COLUMN: usize = 5;

const SUGAR_LABELS: [&str; 2] = ["Zucker", "Sugar"];
const FIBRE_LABELS: [&str; 2] = ["Ballaststoffe", "Dietary fibre"];

static HEADLINE: LazyLock<Selector> = LazyLock::new(|| selector("#fddb-headline1"));
static DIARY_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("table.myday-table-std tr"));
static STYLED: LazyLock<Selector> = LazyLock::new(|| selector("[style]"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static SIDE_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("div.sidrow"));

static NON_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9.,]").unwrap());

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid selector {css}: {err}"))
}

/// Reasons a page could not be turned into a diary entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The page is a login prompt, not a diary.
    #[error("page requires login")]
    Unauthenticated,
    /// No diary table, so no totals row.
    #[error("diary totals row not found")]
    MissingTotals,
    /// A row lacks one of the fixed columns.
    #[error("row {row} has no column {column}")]
    MissingCell { row: usize, column: usize },
    /// A numeric cell holds text without any digits.
    #[error("row {row} column {column} is not a number")]
    InvalidNumber { row: usize, column: usize },
}

/// Parses the diary page for `date`.
///
/// A table holding only the totals row yields an entry without products.
pub fn parse_diary(markup: &str, date: NaiveDate) -> Result<DiaryEntry, ParseError> {
    let document = Html::parse_document(markup);

    if requires_login(&document) {
        return Err(ParseError::Unauthenticated);
    }

    let rows: Vec<ElementRef<'_>> = document.select(&DIARY_ROWS).collect();
    let Some((totals_row, product_rows)) = rows.split_last() else {
        return Err(ParseError::MissingTotals);
    };

    let mut products = Vec::new();
    for (index, row) in product_rows.iter().enumerate() {
        if is_category_separator(*row) {
            continue;
        }
        products.push(parse_product(*row, index + 1)?);
    }

    let totals_row_number = rows.len();
    let cells = cells(*totals_row);
    let total = |column: usize| -> Result<f64, ParseError> {
        let cell = cells.get(column).ok_or(ParseError::MissingTotals)?;
        read_number(&cell_text(*cell), totals_row_number, column)
    };
    let totals = Totals {
        calories: total(CALORIES_COLUMN)?,
        fat: total(FAT_COLUMN)?,
        carbs: total(CARBS_COLUMN)?,
        sugar: side_panel_value(&document, &SUGAR_LABELS, "sugar"),
        protein: total(PROTEIN_COLUMN)?,
        fibre: side_panel_value(&document, &FIBRE_LABELS, "fibre"),
    };

    tracing::debug!(%date, products = products.len(), "parsed diary page");
    Ok(DiaryEntry {
        date,
        products,
        totals,
    })
}

fn requires_login(document: &Html) -> bool {
    document.select(&HEADLINE).any(|headline| {
        let text: String = headline.text().collect();
        LOGIN_MARKERS.iter().any(|marker| text.contains(marker))
    })
}

fn is_category_separator(row: ElementRef<'_>) -> bool {
    row.select(&STYLED).any(|element| {
        element.value().attr("style").is_some_and(|style| {
            let compact: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            compact.contains(SEPARATOR_COLOR)
        })
    })
}

fn parse_product(row: ElementRef<'_>, row_number: usize) -> Result<Product, ParseError> {
    let cells = cells(row);
    let cell = |column: usize| {
        cells.get(column).copied().ok_or(ParseError::MissingCell {
            row: row_number,
            column,
        })
    };
    let number = |column: usize| -> Result<f64, ParseError> {
        read_number(&cell_text(cell(column)?), row_number, column)
    };

    let name_cell = cell(NAME_COLUMN)?;
    let link = name_cell.select(&LINK).next();
    let label = link.map_or_else(|| cell_text(name_cell), cell_text);
    let (amount, name) = split_amount(&label);

    Ok(Product {
        name,
        amount,
        calories: number(CALORIES_COLUMN)?,
        fat: number(FAT_COLUMN)?,
        carbs: number(CARBS_COLUMN)?,
        protein: number(PROTEIN_COLUMN)?,
        link: link
            .and_then(|a| a.value().attr("href"))
            .map(ToString::to_string),
    })
}

/// Splits `"150 g Haferflocken"` into `("150 g", "Haferflocken")`.
///
/// Labels that do not split into exactly three parts are kept whole as the name.
fn split_amount(label: &str) -> (String, String) {
    let parts: Vec<&str> = label.splitn(3, char::is_whitespace).collect();
    match parts.as_slice() {
        [quantity, unit, name] if !quantity.is_empty() && !unit.is_empty() && !name.is_empty() => {
            (format!("{quantity} {unit}"), (*name).trim().to_string())
        }
        _ => (String::new(), label.to_string()),
    }
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "td")
        .collect()
}

/// Collapses the text of an element into single-spaced, trimmed form.
fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads a number regardless of unit suffixes and locale.
///
/// With a comma present, the comma is the decimal separator and dots group
/// thousands (`1.234,5`). Without one, a dot followed by exactly three digits
/// groups thousands (`2.150`) and any other dot is decimal (`2.5`). Returns
/// `None` when the text has no digits.
fn extract_number(text: &str) -> Option<f64> {
    let cleaned = NON_NUMERIC.replace_all(text, "");
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = if let Some(pos) = cleaned.rfind(',') {
        let integer: String = cleaned[..pos].chars().filter(char::is_ascii_digit).collect();
        format!("{integer}.{}", &cleaned[pos + 1..])
    } else {
        let mut groups = cleaned.split('.');
        let head = groups.next().unwrap_or_default();
        let tail: Vec<&str> = groups.collect();
        if !head.is_empty() && tail.iter().all(|group| group.len() == 3) {
            format!("{head}{}", tail.concat())
        } else {
            let (last, rest) = tail.split_last().map_or(("", &[][..]), |(l, r)| (*l, r));
            format!("{head}{}.{last}", rest.concat())
        }
    };
    normalized.parse().ok()
}

/// Reads a numeric cell. Blank and dash-only cells count as 0.
fn read_number(text: &str, row: usize, column: usize) -> Result<f64, ParseError> {
    if text.is_empty() || text == "-" || text == "\u{2013}" {
        return Ok(0.0);
    }
    extract_number(text).ok_or(ParseError::InvalidNumber { row, column })
}

fn side_panel_value(document: &Html, labels: &[&str], nutrient: &'static str) -> f64 {
    for row in document.select(&SIDE_ROWS) {
        let parts: Vec<ElementRef<'_>> = row.children().filter_map(ElementRef::wrap).collect();
        let [label, value, ..] = parts.as_slice() else {
            continue;
        };
        let label = cell_text(*label);
        if labels.iter().any(|candidate| label == *candidate) {
            return extract_number(&cell_text(*value)).unwrap_or_default();
        }
    }
    tracing::warn!(nutrient, "nutrient missing from side panel, assuming 0");
    0.0
}
