//! Co-occurrence of consumed foods with external event dates.
//!
//! For every occurrence date the engine checks whether a matching product was
//! consumed on the same day, one day before, or two days before. Percentages
//! are relative to the number of distinct days on which any matching product
//! was consumed.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::diary::{DatedProduct, format_date};
use crate::store::{DiaryStore, ProductFilter, StoreError};

/// Analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationInput {
    pub inclusion_keywords: BTreeSet<String>,
    #[serde(default)]
    pub exclusion_keywords: BTreeSet<String>,
    pub occurrence_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

/// Matches for one offset window or a union of windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationDetail {
    pub percentage: f64,
    pub matched_dates: Vec<String>,
    pub matched_days: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlations {
    pub same_day: CorrelationDetail,
    pub one_day_before: CorrelationDetail,
    pub two_days_before: CorrelationDetail,
    #[serde(rename = "across2Days")]
    pub across_2_days: CorrelationDetail,
    #[serde(rename = "across3Days")]
    pub across_3_days: CorrelationDetail,
}

/// Analysis result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationOutput {
    pub matched_products: Vec<String>,
    pub matched_dates: Vec<String>,
    pub amount_matched_products: usize,
    pub amount_matched_dates: usize,
    pub correlations: Correlations,
}

/// Runs the analysis against `store`.
///
/// Empty keyword or date sets produce all-zero results.
pub fn correlate<S: DiaryStore + ?Sized>(
    store: &S,
    input: &CorrelationInput,
) -> Result<CorrelationOutput, StoreError> {
    let filter = ProductFilter::new(
        &input.inclusion_keywords,
        &input.exclusion_keywords,
        input.start_date,
    );
    let matches = if filter.include().is_empty() {
        Vec::new()
    } else {
        store.find_products_with_filters(&filter)?
    };
    tracing::debug!(matches = matches.len(), "loaded matching products");
    Ok(summarize(&matches, &input.occurrence_dates))
}

/// Builds the output from the matching `(date, product)` pairs.
pub fn summarize(matches: &[DatedProduct], occurrences: &[NaiveDate]) -> CorrelationOutput {
    let products: BTreeSet<&str> = matches.iter().map(|m| m.product.name.as_str()).collect();
    let dates: BTreeSet<NaiveDate> = matches.iter().map(|m| m.date).collect();
    let total = dates.len();

    let same_day = offset_matches(&dates, occurrences, 0);
    let one_day_before = offset_matches(&dates, occurrences, 1);
    let two_days_before = offset_matches(&dates, occurrences, 2);
    let across_2_days: BTreeSet<NaiveDate> = same_day.union(&one_day_before).copied().collect();
    let across_3_days: BTreeSet<NaiveDate> =
        across_2_days.union(&two_days_before).copied().collect();

    CorrelationOutput {
        matched_products: products.iter().map(ToString::to_string).collect(),
        matched_dates: dates.iter().copied().map(format_date).collect(),
        amount_matched_products: products.len(),
        amount_matched_dates: total,
        correlations: Correlations {
            same_day: detail(&same_day, total),
            one_day_before: detail(&one_day_before, total),
            two_days_before: detail(&two_days_before, total),
            across_2_days: detail(&across_2_days, total),
            across_3_days: detail(&across_3_days, total),
        },
    }
}

/// Consumption dates lying `offset` days before some occurrence.
fn offset_matches(
    consumed: &BTreeSet<NaiveDate>,
    occurrences: &[NaiveDate],
    offset: u64,
) -> BTreeSet<NaiveDate> {
    occurrences
        .iter()
        .filter_map(|occurrence| occurrence.checked_sub_days(Days::new(offset)))
        .filter(|target| consumed.contains(target))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn detail(dates: &BTreeSet<NaiveDate>, total: usize) -> CorrelationDetail {
    let percentage = if total == 0 {
        0.0
    } else {
        100.0 * dates.len() as f64 / total as f64
    };
    CorrelationDetail {
        percentage,
        matched_dates: dates.iter().copied().map(format_date).collect(),
        matched_days: dates.len(),
    }
}
