//! Search stored products by name.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use nt_core::{Capability, DatedProduct};
use serde::Serialize;

use crate::Config;
use crate::commands::open_database;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Part of the product name, case-insensitive.
    pub name: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SearchHit<'a> {
    date: String,
    name: &'a str,
    amount: &'a str,
    calories: f64,
    link: Option<&'a str>,
}

pub fn run<W: Write>(writer: &mut W, args: &SearchArgs, config: &Config) -> Result<()> {
    config.capabilities().require(Capability::DocumentStore)?;
    let db = open_database(config)?;
    let hits = db.find_products_fuzzy(&args.name)?;
    tracing::debug!(query = %args.name, hits = hits.len(), "product search");
    if args.json {
        write_json(writer, &hits)
    } else {
        write_table(writer, &args.name, &hits)
    }
}

fn write_table<W: Write>(writer: &mut W, query: &str, hits: &[DatedProduct]) -> Result<()> {
    if hits.is_empty() {
        writeln!(writer, "No products matching '{query}'.")?;
        return Ok(());
    }
    for hit in hits {
        let product = &hit.product;
        if product.amount.is_empty() {
            writeln!(
                writer,
                "{}  {} ({:.0} kcal)",
                hit.date, product.name, product.calories
            )?;
        } else {
            writeln!(
                writer,
                "{}  {} ({}, {:.0} kcal)",
                hit.date, product.name, product.amount, product.calories
            )?;
        }
    }
    Ok(())
}

fn write_json<W: Write>(writer: &mut W, hits: &[DatedProduct]) -> Result<()> {
    let rows: Vec<SearchHit<'_>> = hits
        .iter()
        .map(|hit| SearchHit {
            date: nt_core::format_date(hit.date),
            name: &hit.product.name,
            amount: &hit.product.amount,
            calories: hit.product.calories,
            link: hit.product.link.as_deref(),
        })
        .collect();
    writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use nt_core::Product;

    use super::*;

    fn hit(date: &str, name: &str, amount: &str, calories: f64) -> DatedProduct {
        DatedProduct {
            date: date.parse::<NaiveDate>().unwrap(),
            product: Product {
                name: name.to_string(),
                amount: amount.to_string(),
                calories,
                fat: 0.0,
                carbs: 0.0,
                protein: 0.0,
                link: None,
            },
        }
    }

    #[test]
    fn table_lists_hits() {
        let hits = vec![
            hit("2024-01-03", "Milchreis", "1 Portion", 120.4),
            hit("2024-01-01", "Vollmilch", "", 130.0),
        ];
        let mut output = Vec::new();
        write_table(&mut output, "milch", &hits).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        2024-01-03  Milchreis (1 Portion, 120 kcal)
        2024-01-01  Vollmilch (130 kcal)
        ");
    }

    #[test]
    fn table_reports_no_hits() {
        let mut output = Vec::new();
        write_table(&mut output, "tofu", &[]).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"No products matching 'tofu'.");
    }

    #[test]
    fn json_lists_hits() {
        let mut output = Vec::new();
        write_json(&mut output, &[hit("2024-01-03", "Milchreis", "1 Portion", 120.0)]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value[0]["date"], "2024-01-03");
        assert_eq!(value[0]["name"], "Milchreis");
        assert!(value[0]["link"].is_null());
    }
}
