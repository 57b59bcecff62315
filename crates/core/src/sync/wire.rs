//! Catalog and order payloads as the commerce platform returns them.
//!
//! Only the fields the reconciler reads are modeled; everything else in the
//! payloads is ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const OBJECT_TYPE_ITEM: &str = "ITEM";
pub const OBJECT_TYPE_ITEM_VARIATION: &str = "ITEM_VARIATION";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub item_data: Option<ItemData>,
    #[serde(default)]
    pub item_variation_data: Option<ItemVariationData>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variations: Vec<CatalogObject>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVariationData {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price_money: Option<Money>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub objects: Vec<CatalogObject>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    #[serde(default)]
    pub catalog_object_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Decimal text such as `"2"` or `"1.5"`; some payloads send a number.
    #[serde(deserialize_with = "quantity_text")]
    pub quantity: String,
    #[serde(default)]
    pub base_price_money: Option<Money>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One order search request. `cursor` is `None` for the first page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderQuery {
    pub location_ids: Vec<String>,
    pub created_from: DateTime<Utc>,
    pub created_to: DateTime<Utc>,
    pub limit: u32,
    pub cursor: Option<String>,
}

fn quantity_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
