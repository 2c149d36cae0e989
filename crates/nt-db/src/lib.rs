//! Storage layer for the nutrition diary tracker.
//!
//! Provides persistence for diary entries using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Concurrent writers
//!
//! Each calendar date has at most one row (`UNIQUE(date)`). Updates are
//! optimistic: they only apply when the stored `revision` still matches the
//! one that was read, otherwise the write fails with [`DbError::Conflict`].
//! Writes run inside `BEGIN IMMEDIATE` transactions.
//!
//! # Schema
//!
//! Dates are stored as TEXT in `YYYY-MM-DD` form so that lexicographic order
//! matches chronological order. Timestamps (`created_at`, `updated_at`) use
//! RFC 3339 in UTC. Products live in their own table, ordered by `position`
//! within an entry.

use std::path::Path;

use chrono::{NaiveDate, SecondsFormat, Utc};
use nt_core::{
    DatedProduct, DiaryEntry, DiaryStore, NutrientField, Product, ProductFilter, StoreError,
    StoredEntry, Totals, format_date,
};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use thiserror::Error;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const ENTRY_COLUMNS: &str = "id, date, revision, total_calories, total_fat, total_carbs, total_sugar, total_protein, total_fibre";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored date could not be parsed.
    #[error("invalid stored date: {value}")]
    DateParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Another writer got there first.
    #[error("concurrent write detected for {date}")]
    Conflict { date: NaiveDate },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict { date } => Self::Conflict { date },
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS diary_entries (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL UNIQUE,
                revision INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                total_calories REAL NOT NULL,
                total_fat REAL NOT NULL,
                total_carbs REAL NOT NULL,
                total_sugar REAL NOT NULL,
                total_protein REAL NOT NULL,
                total_fibre REAL NOT NULL
            );

            -- Products: line items of an entry, in page order
            CREATE TABLE IF NOT EXISTS products (
                entry_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount TEXT NOT NULL,
                calories REAL NOT NULL,
                fat REAL NOT NULL,
                carbs REAL NOT NULL,
                protein REAL NOT NULL,
                link TEXT,
                PRIMARY KEY (entry_id, position),
                FOREIGN KEY (entry_id) REFERENCES diary_entries(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);
            ",
        )?;
        Ok(())
    }

    /// Looks up the entry stored for `date`.
    pub fn entry_for_date(&self, date: NaiveDate) -> Result<Option<StoredEntry>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM diary_entries WHERE date = ?"),
                [format_date(date)],
                EntryRow::from_row,
            )
            .optional()?;
        row.map(|row| row.into_stored(&self.conn)).transpose()
    }

    /// Inserts a new entry with a fresh identifier.
    pub fn insert_entry(&mut self, entry: &DiaryEntry) -> Result<StoredEntry, DbError> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "
            INSERT INTO diary_entries
            (id, date, revision, created_at, updated_at, total_calories, total_fat, total_carbs, total_sugar, total_protein, total_fibre)
            VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                id,
                format_date(entry.date),
                now,
                now,
                entry.totals.calories,
                entry.totals.fat,
                entry.totals.carbs,
                entry.totals.sugar,
                entry.totals.protein,
                entry.totals.fibre,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(DbError::Conflict { date: entry.date });
            }
            Err(err) => return Err(err.into()),
        }
        insert_products(&tx, &id, &entry.products)?;
        tx.commit()?;
        tracing::debug!(date = %entry.date, %id, "stored new diary entry");

        Ok(StoredEntry {
            id,
            revision: 1,
            entry: entry.clone(),
        })
    }

    /// Replaces nutrition fields and products of an existing entry.
    ///
    /// Fails with [`DbError::Conflict`] if the row changed since it was read.
    pub fn update_entry(&mut self, stored: &StoredEntry) -> Result<StoredEntry, DbError> {
        let totals = &stored.entry.totals;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "
            UPDATE diary_entries SET
                revision = revision + 1,
                updated_at = ?,
                total_calories = ?,
                total_fat = ?,
                total_carbs = ?,
                total_sugar = ?,
                total_protein = ?,
                total_fibre = ?
            WHERE id = ? AND revision = ?
            ",
            params![
                now_timestamp(),
                totals.calories,
                totals.fat,
                totals.carbs,
                totals.sugar,
                totals.protein,
                totals.fibre,
                stored.id,
                stored.revision,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::Conflict {
                date: stored.entry.date,
            });
        }
        tx.execute("DELETE FROM products WHERE entry_id = ?", [&stored.id])?;
        insert_products(&tx, &stored.id, &stored.entry.products)?;
        tx.commit()?;

        Ok(StoredEntry {
            revision: stored.revision + 1,
            ..stored.clone()
        })
    }

    /// Lists every product with its date, optionally from `since` onwards.
    fn dated_products(&self, since: Option<NaiveDate>) -> Result<Vec<DatedProduct>, DbError> {
        let since = since.map_or_else(String::new, format_date);
        let mut stmt = self.conn.prepare(
            "
            SELECT e.date, p.name, p.amount, p.calories, p.fat, p.carbs, p.protein, p.link
            FROM products p
            JOIN diary_entries e ON e.id = p.entry_id
            WHERE e.date >= ?
            ORDER BY e.date ASC, p.position ASC
            ",
        )?;
        let rows = stmt.query_map([since], |row| {
            let date: String = row.get(0)?;
            Ok((date, product_from_row(row, 1)?))
        })?;
        let mut products = Vec::new();
        for row in rows {
            let (date, product) = row?;
            products.push(DatedProduct {
                date: parse_date(&date)?,
                product,
            });
        }
        Ok(products)
    }

    /// Finds products whose name contains `name`, ignoring case, newest first.
    pub fn find_products_fuzzy(&self, name: &str) -> Result<Vec<DatedProduct>, DbError> {
        let filter = ProductFilter::new([name], Vec::<String>::new(), None);
        let mut products = self.matching_products(&filter)?;
        products.reverse();
        Ok(products)
    }

    // SQLite's LOWER and LIKE only fold ASCII, so keyword matching runs here.
    fn matching_products(&self, filter: &ProductFilter) -> Result<Vec<DatedProduct>, DbError> {
        let mut products = self.dated_products(filter.since())?;
        products.retain(|dated| filter.matches_name(&dated.product.name));
        Ok(products)
    }

    /// Number of stored diary days.
    pub fn count_entries(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM diary_entries", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Average day totals, or `None` when the store is empty.
    pub fn average_totals(&self) -> Result<Option<Totals>, DbError> {
        let averages = self.conn.query_row(
            "
            SELECT AVG(total_calories), AVG(total_fat), AVG(total_carbs),
                   AVG(total_sugar), AVG(total_protein), AVG(total_fibre)
            FROM diary_entries
            ",
            [],
            |row| {
                let calories: Option<f64> = row.get(0)?;
                Ok(calories.map(|calories| -> rusqlite::Result<Totals> {
                    Ok(Totals {
                        calories,
                        fat: row.get(1)?,
                        carbs: row.get(2)?,
                        sugar: row.get(3)?,
                        protein: row.get(4)?,
                        fibre: row.get(5)?,
                    })
                }))
            },
        )?;
        Ok(averages.transpose()?)
    }

    /// The day with the highest total of `field`. Ties go to the earliest day.
    pub fn max_by(&self, field: NutrientField) -> Result<Option<StoredEntry>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM diary_entries ORDER BY {} DESC, date ASC LIMIT 1",
                    total_column(field)
                ),
                [],
                EntryRow::from_row,
            )
            .optional()?;
        row.map(|row| row.into_stored(&self.conn)).transpose()
    }
}

impl DiaryStore for Database {
    fn find_by_date(&self, date: NaiveDate) -> Result<Option<StoredEntry>, StoreError> {
        Ok(self.entry_for_date(date)?)
    }

    fn insert(&mut self, entry: &DiaryEntry) -> Result<StoredEntry, StoreError> {
        Ok(self.insert_entry(entry)?)
    }

    fn update(&mut self, stored: &StoredEntry) -> Result<StoredEntry, StoreError> {
        Ok(self.update_entry(stored)?)
    }

    fn find_products_with_filters(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<DatedProduct>, StoreError> {
        Ok(self.matching_products(filter)?)
    }
}

/// Entry columns before products are attached.
struct EntryRow {
    id: String,
    date: String,
    revision: i64,
    totals: Totals,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            revision: row.get(2)?,
            totals: Totals {
                calories: row.get(3)?,
                fat: row.get(4)?,
                carbs: row.get(5)?,
                sugar: row.get(6)?,
                protein: row.get(7)?,
                fibre: row.get(8)?,
            },
        })
    }

    fn into_stored(self, conn: &Connection) -> Result<StoredEntry, DbError> {
        let mut stmt = conn.prepare(
            "
            SELECT name, amount, calories, fat, carbs, protein, link
            FROM products
            WHERE entry_id = ?
            ORDER BY position ASC
            ",
        )?;
        let rows = stmt.query_map([&self.id], |row| product_from_row(row, 0))?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row?);
        }
        Ok(StoredEntry {
            entry: DiaryEntry {
                date: parse_date(&self.date)?,
                products,
                totals: self.totals,
            },
            id: self.id,
            revision: self.revision,
        })
    }
}

fn product_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Product> {
    Ok(Product {
        name: row.get(offset)?,
        amount: row.get(offset + 1)?,
        calories: row.get(offset + 2)?,
        fat: row.get(offset + 3)?,
        carbs: row.get(offset + 4)?,
        protein: row.get(offset + 5)?,
        link: row.get(offset + 6)?,
    })
}

fn insert_products(tx: &Transaction<'_>, entry_id: &str, products: &[Product]) -> Result<(), DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT INTO products
        (entry_id, position, name, amount, calories, fat, carbs, protein, link)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )?;
    for (position, product) in (0_i64..).zip(products) {
        stmt.execute(params![
            entry_id,
            position,
            product.name,
            product.amount,
            product.calories,
            product.fat,
            product.carbs,
            product.protein,
            product.link,
        ])?;
    }
    Ok(())
}

const fn total_column(field: NutrientField) -> &'static str {
    match field {
        NutrientField::Calories => "total_calories",
        NutrientField::Fat => "total_fat",
        NutrientField::Carbs => "total_carbs",
        NutrientField::Sugar => "total_sugar",
        NutrientField::Protein => "total_protein",
        NutrientField::Fibre => "total_fibre",
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| DbError::DateParse {
        value: value.to_string(),
        source,
    })
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
