//! Diary domain types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One consumed line item of a diary day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Serving size as printed on the page (e.g. `150 g`), empty when unknown.
    pub amount: String,
    pub calories: f64,
    pub fat: f64,
    pub carbs: f64,
    pub protein: f64,
    pub link: Option<String>,
}

/// Day totals. Sugar and fibre are only available as totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub calories: f64,
    pub fat: f64,
    pub carbs: f64,
    pub sugar: f64,
    pub protein: f64,
    pub fibre: f64,
}

impl Totals {
    /// Returns the value of a single nutrient.
    pub const fn get(&self, field: NutrientField) -> f64 {
        match field {
            NutrientField::Calories => self.calories,
            NutrientField::Fat => self.fat,
            NutrientField::Carbs => self.carbs,
            NutrientField::Sugar => self.sugar,
            NutrientField::Protein => self.protein,
            NutrientField::Fibre => self.fibre,
        }
    }
}

/// One day's nutrition record as parsed from the source site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub date: NaiveDate,
    pub products: Vec<Product>,
    pub totals: Totals,
}

/// A diary entry as persisted by a store.
///
/// `id` is assigned by the store on insert. `revision` increases on every
/// write and guards updates against concurrent writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: String,
    pub revision: i64,
    pub entry: DiaryEntry,
}

impl StoredEntry {
    /// Copies the nutrition fields of `incoming` into this record.
    ///
    /// Identity fields (`id`, `date`) are left untouched.
    pub fn merge_nutrition(&mut self, incoming: &DiaryEntry) {
        self.entry.products.clone_from(&incoming.products);
        self.entry.totals = incoming.totals;
    }
}

/// A product together with the day it was consumed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedProduct {
    pub date: NaiveDate,
    pub product: Product,
}

/// Nutrient selector for aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutrientField {
    Calories,
    Fat,
    Carbs,
    Sugar,
    Protein,
    Fibre,
}

impl NutrientField {
    pub const ALL: [Self; 6] = [
        Self::Calories,
        Self::Fat,
        Self::Carbs,
        Self::Sugar,
        Self::Protein,
        Self::Fibre,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Calories => "calories",
            Self::Fat => "fat",
            Self::Carbs => "carbs",
            Self::Sugar => "sugar",
            Self::Protein => "protein",
            Self::Fibre => "fibre",
        }
    }
}

impl fmt::Display for NutrientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NutrientField {
    type Err = UnknownNutrient;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calories" | "kcal" => Ok(Self::Calories),
            "fat" => Ok(Self::Fat),
            "carbs" => Ok(Self::Carbs),
            "sugar" => Ok(Self::Sugar),
            "protein" => Ok(Self::Protein),
            "fibre" | "fiber" => Ok(Self::Fibre),
            _ => Err(UnknownNutrient(s.to_string())),
        }
    }
}

/// Error type for unknown nutrient names.
#[derive(Debug, Clone)]
pub struct UnknownNutrient(String);

impl fmt::Display for UnknownNutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown nutrient: {}", self.0)
    }
}

impl std::error::Error for UnknownNutrient {}

/// Formats a date the way it appears in results (`YYYY-MM-DD`).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, calories: f64) -> Product {
        Product {
            name: name.to_string(),
            amount: "100 g".to_string(),
            calories,
            fat: 1.0,
            carbs: 2.0,
            protein: 3.0,
            link: None,
        }
    }

    #[test]
    fn merge_keeps_identity_fields() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 27).unwrap();
        let mut stored = StoredEntry {
            id: "entry-1".to_string(),
            revision: 3,
            entry: DiaryEntry {
                date,
                products: vec![product("Apfel", 52.0)],
                totals: Totals {
                    calories: 52.0,
                    ..Totals::default()
                },
            },
        };
        let incoming = DiaryEntry {
            date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            products: vec![product("Apfel", 52.0), product("Birne", 57.0)],
            totals: Totals {
                calories: 109.0,
                sugar: 20.0,
                ..Totals::default()
            },
        };

        stored.merge_nutrition(&incoming);

        assert_eq!(stored.id, "entry-1");
        assert_eq!(stored.revision, 3);
        assert_eq!(stored.entry.date, date);
        assert_eq!(stored.entry.products, incoming.products);
        assert_eq!(stored.entry.totals, incoming.totals);
    }

    #[test]
    fn nutrient_names_roundtrip() {
        for field in NutrientField::ALL {
            let parsed: NutrientField = field.as_str().parse().expect("should parse");
            assert_eq!(parsed, field);
        }
        assert_eq!("fiber".parse::<NutrientField>().unwrap(), NutrientField::Fibre);
        let err = "salt".parse::<NutrientField>().unwrap_err();
        assert_eq!(err.to_string(), "unknown nutrient: salt");
    }

    #[test]
    fn totals_get_selects_field() {
        let totals = Totals {
            calories: 1.0,
            fat: 2.0,
            carbs: 3.0,
            sugar: 4.0,
            protein: 5.0,
            fibre: 6.0,
        };
        let values: Vec<f64> = NutrientField::ALL.iter().map(|f| totals.get(*f)).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
