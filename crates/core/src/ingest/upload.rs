use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::sales::{canonical_money, SalesLine, SalesOrigin};
use crate::errors::IngestError;
use crate::identity::{ProductIdentityResolver, DAILY_TOTAL_PRODUCT_ID};
use crate::ingest::dates::{parse_uniform_dates, DateFormat};
use crate::ledger::aggregate_lines;

pub const COLUMN_DATE: &str = "Date";
pub const COLUMN_TOTAL_AMOUNT: &str = "Total Amount";
pub const COLUMN_PRODUCT_NAME: &str = "Product Name";
pub const COLUMN_PRICE: &str = "Price";
pub const COLUMN_QUANTITY: &str = "Quantity";

/// Accepted upload layouts. Detection is by header only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSchema {
    LineItem,
    DailyTotal,
}

impl UploadSchema {
    /// Line-item is listed first so it wins when a file satisfies both.
    pub const CANDIDATES: [UploadSchema; 2] = [Self::LineItem, Self::DailyTotal];

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::LineItem => &[COLUMN_DATE, COLUMN_PRODUCT_NAME, COLUMN_PRICE, COLUMN_QUANTITY],
            Self::DailyTotal => &[COLUMN_DATE, COLUMN_TOTAL_AMOUNT],
        }
    }

    fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.required_columns()
            .iter()
            .filter(|column| !headers.iter().any(|header| header == *column))
            .map(|column| column.to_string())
            .collect()
    }

    /// Selects the first fully satisfied schema. Otherwise reports the missing
    /// columns of the schema that came closest.
    pub fn detect(headers: &[String]) -> Result<Self, IngestError> {
        let mut closest: Option<Vec<String>> = None;
        for schema in Self::CANDIDATES {
            let missing = schema.missing_columns(headers);
            if missing.is_empty() {
                return Ok(schema);
            }
            if closest.as_ref().map_or(true, |best| missing.len() < best.len()) {
                closest = Some(missing);
            }
        }
        Err(IngestError::Schema { missing: closest.unwrap_or_default() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedUpload {
    pub schema: UploadSchema,
    pub date_format: DateFormat,
    pub rows_read: usize,
    /// Lines pre-aggregated by (date, product id, price).
    pub lines: Vec<SalesLine>,
}

impl NormalizedUpload {
    pub fn total_revenue(&self) -> Decimal {
        self.lines.iter().map(|line| line.revenue).sum()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.lines.iter().map(|line| line.date).min()?;
        let last = self.lines.iter().map(|line| line.date).max()?;
        Some((first, last))
    }
}

pub fn ensure_csv_filename(filename: &str) -> Result<(), IngestError> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension == "csv" {
        Ok(())
    } else {
        Err(IngestError::UnsupportedFormat { extension })
    }
}

/// Parses an uploaded CSV into aggregated ledger lines.
pub fn normalize_csv(
    content: &[u8],
    resolver: &ProductIdentityResolver,
) -> Result<NormalizedUpload, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|error| IngestError::Unreadable(error.to_string()))?
        .iter()
        .map(|value| value.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<String>>();

    if headers.iter().all(|header| header.is_empty()) {
        return Err(IngestError::EmptyInput);
    }

    let schema = UploadSchema::detect(&headers)?;
    let index_by_name = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.clone(), index))
        .collect::<HashMap<String, usize>>();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|error| IngestError::Unreadable(error.to_string()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let raw_dates = records
        .iter()
        .map(|record| cell(record, &index_by_name, COLUMN_DATE))
        .collect::<Vec<&str>>();
    let (date_format, dates) = parse_uniform_dates(&raw_dates)?;

    let mut lines = Vec::with_capacity(records.len());
    for (position, (record, date)) in records.iter().zip(dates).enumerate() {
        let row = position + 1;
        let line = match schema {
            UploadSchema::DailyTotal => {
                let amount = read_amount(record, &index_by_name, COLUMN_TOTAL_AMOUNT, row)?;
                SalesLine {
                    date,
                    product_id: DAILY_TOTAL_PRODUCT_ID.to_string(),
                    product_name: String::new(),
                    unit_price: Decimal::ZERO,
                    units_sold: 0,
                    revenue: amount,
                    origin: SalesOrigin::Upload,
                }
            }
            UploadSchema::LineItem => {
                let name = cell(record, &index_by_name, COLUMN_PRODUCT_NAME);
                if name.is_empty() {
                    return Err(invalid_value(row, COLUMN_PRODUCT_NAME, name));
                }
                let price = read_amount(record, &index_by_name, COLUMN_PRICE, row)?;
                let quantity = read_quantity(record, &index_by_name, row)?;
                SalesLine {
                    date,
                    product_id: resolver.resolve(name),
                    product_name: name.to_string(),
                    unit_price: canonical_money(price),
                    units_sold: quantity,
                    revenue: price * Decimal::from(quantity),
                    origin: SalesOrigin::Upload,
                }
            }
        };
        lines.push(line);
    }

    Ok(NormalizedUpload {
        schema,
        date_format,
        rows_read: records.len(),
        lines: aggregate_lines(lines),
    })
}

fn cell<'r>(
    record: &'r csv::StringRecord,
    index_by_name: &HashMap<String, usize>,
    column: &str,
) -> &'r str {
    index_by_name.get(column).and_then(|index| record.get(*index)).unwrap_or_default().trim()
}

fn invalid_value(row: usize, column: &str, value: &str) -> IngestError {
    IngestError::InvalidValue { row, column: column.to_string(), value: value.to_string() }
}

fn read_amount(
    record: &csv::StringRecord,
    index_by_name: &HashMap<String, usize>,
    column: &str,
    row: usize,
) -> Result<Decimal, IngestError> {
    let raw = cell(record, index_by_name, column);
    parse_amount(raw)
        .filter(|amount| *amount >= Decimal::ZERO)
        .ok_or_else(|| invalid_value(row, column, raw))
}

fn read_quantity(
    record: &csv::StringRecord,
    index_by_name: &HashMap<String, usize>,
    row: usize,
) -> Result<i64, IngestError> {
    let raw = cell(record, index_by_name, COLUMN_QUANTITY);
    parse_quantity(raw)
        .filter(|quantity| *quantity >= 0)
        .ok_or_else(|| invalid_value(row, COLUMN_QUANTITY, raw))
}

/// Accepts `1234.5`, `$1,234.50` and `-$3`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    let cleaned = unsigned.trim_start_matches('$').replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    let amount = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -amount } else { amount })
}

/// Whole unit counts; `3.0` is accepted, `2.5` is not.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let decimal = Decimal::from_str(trimmed).ok()?;
    if decimal.fract().is_zero() {
        decimal.to_i64()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{
        ensure_csv_filename, normalize_csv, parse_amount, parse_quantity, UploadSchema,
    };
    use crate::errors::IngestError;
    use crate::identity::{CatalogSnapshot, ProductIdentityResolver, DAILY_TOTAL_PRODUCT_ID};
    use crate::ingest::dates::DateFormat;

    fn resolver() -> ProductIdentityResolver {
        ProductIdentityResolver::default()
    }

    #[test]
    fn daily_totals_on_the_same_date_collapse_into_one_line() {
        let csv = "Date,Total Amount\n2024-01-01,50.00\n2024-01-01,25.00\n";
        let upload = normalize_csv(csv.as_bytes(), &resolver()).expect("normalize");

        assert_eq!(upload.schema, UploadSchema::DailyTotal);
        assert_eq!(upload.rows_read, 2);
        assert_eq!(upload.lines.len(), 1);
        assert_eq!(upload.lines[0].product_id, DAILY_TOTAL_PRODUCT_ID);
        assert_eq!(upload.lines[0].revenue.to_string(), "75.00");
    }

    #[test]
    fn line_items_are_grouped_by_date_product_and_price() {
        let csv = "\u{feff}Date, Product Name ,Price,Quantity\n\
                   2024-02-01,Latte,4.50,2\n\
                   2024-02-01,latte ,4.5,1\n\
                   2024-02-01,Latte,5.00,1\n\
                   2024-02-02,Muffin,$3.25,4\n";
        let upload = normalize_csv(csv.as_bytes(), &resolver()).expect("normalize");

        assert_eq!(upload.schema, UploadSchema::LineItem);
        assert_eq!(upload.lines.len(), 3);
        let latte = &upload.lines[0];
        assert_eq!(latte.product_id, "gen_latte");
        assert_eq!(latte.units_sold, 3);
        assert_eq!(latte.revenue.to_string(), "13.50");
        assert_eq!(upload.total_revenue(), Decimal::from_str("31.50").unwrap());
    }

    #[test]
    fn revenue_total_matches_price_times_quantity_sum() {
        let csv = "Date,Product Name,Price,Quantity\n\
                   03/01/2024,Scone,2.75,3\n\
                   03/02/2024,Scone,2.75,1\n\
                   03/02/2024,Tea,1.20,10\n";
        let upload = normalize_csv(csv.as_bytes(), &resolver()).expect("normalize");

        let expected = Decimal::from_str("2.75").unwrap() * Decimal::from(4)
            + Decimal::from_str("1.20").unwrap() * Decimal::from(10);
        assert_eq!(upload.total_revenue(), expected);
        assert_eq!(upload.date_format, DateFormat::Us);
    }

    #[test]
    fn catalog_names_resolve_to_catalog_ids() {
        let mut catalog = CatalogSnapshot::new();
        catalog.insert("Latte", "ITEM_LATTE");
        let csv = "Date,Product Name,Price,Quantity\n2024-02-01,LATTE,4.50,2\n";

        let upload =
            normalize_csv(csv.as_bytes(), &ProductIdentityResolver::new(catalog)).expect("ok");

        assert_eq!(upload.lines[0].product_id, "ITEM_LATTE");
        assert_eq!(upload.lines[0].product_name, "LATTE");
    }

    #[test]
    fn missing_columns_are_named() {
        let csv = "Date,Product Name,Price,Qty\n2024-01-01,Latte,4.50,2\n";
        let error = normalize_csv(csv.as_bytes(), &resolver()).expect_err("schema error");
        assert_eq!(error, IngestError::Schema { missing: vec!["Quantity".to_string()] });

        let csv = "Date,Product Name,Price\n2024-01-01,Latte,4.50\n";
        let error = normalize_csv(csv.as_bytes(), &resolver()).expect_err("tie");
        assert_eq!(error, IngestError::Schema { missing: vec!["Quantity".to_string()] });
    }

    #[test]
    fn closest_schema_wins_when_neither_matches() {
        let error = normalize_csv("Date,Amount\n2024-01-01,5\n".as_bytes(), &resolver())
            .expect_err("schema error");
        assert_eq!(error, IngestError::Schema { missing: vec!["Total Amount".to_string()] });
    }

    #[test]
    fn header_only_file_is_empty_input() {
        let error = normalize_csv("Date,Total Amount\n\n".as_bytes(), &resolver())
            .expect_err("empty input");
        assert_eq!(error, IngestError::EmptyInput);
        assert_eq!(normalize_csv(b"", &resolver()).expect_err("empty"), IngestError::EmptyInput);
    }

    #[test]
    fn negative_or_fractional_quantities_are_rejected() {
        let csv = "Date,Product Name,Price,Quantity\n2024-01-01,Latte,4.50,1.5\n";
        let error = normalize_csv(csv.as_bytes(), &resolver()).expect_err("invalid quantity");
        assert_eq!(
            error,
            IngestError::InvalidValue {
                row: 1,
                column: "Quantity".to_string(),
                value: "1.5".to_string(),
            }
        );

        let csv = "Date,Total Amount\n2024-01-01,-4\n";
        assert!(matches!(
            normalize_csv(csv.as_bytes(), &resolver()),
            Err(IngestError::InvalidValue { .. })
        ));
    }

    #[test]
    fn mixed_date_formats_are_rejected() {
        let csv = "Date,Total Amount\n2024-01-01,5\nJan 2 2024,6\n";
        let error = normalize_csv(csv.as_bytes(), &resolver()).expect_err("date error");
        assert_eq!(error, IngestError::DateFormat { sample: "Jan 2 2024".to_string() });
    }

    #[test]
    fn amount_and_quantity_parsing() {
        assert_eq!(parse_amount("$1,234.50"), Some(Decimal::from_str("1234.50").unwrap()));
        assert_eq!(parse_amount("-$3"), Some(Decimal::from(-3)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_quantity("3.0"), Some(3));
        assert_eq!(parse_quantity("2.5"), None);
    }

    #[test]
    fn only_csv_files_are_accepted() {
        assert!(ensure_csv_filename("sales.CSV").is_ok());
        assert_eq!(
            ensure_csv_filename("sales.xlsx"),
            Err(IngestError::UnsupportedFormat { extension: "xlsx".to_string() })
        );
    }
}
