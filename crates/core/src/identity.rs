//! Product identity resolution.
//!
//! Free-text product names from uploads and order lines are mapped to one
//! stable identifier per business. A catalog id always wins; without one the
//! identifier is derived from the normalized name and carries the
//! [`GENERATED_ID_PREFIX`] marker so it can never be mistaken for a catalog id.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub const GENERATED_ID_PREFIX: &str = "gen_";

/// Reserved product id for rows uploaded in the daily-total schema.
pub const DAILY_TOTAL_PRODUCT_ID: &str = "gen_daily_total";

/// Lower-cases, trims and collapses inner whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn generated_id(name: &str) -> String {
    let normalized = normalize_name(name);
    let mut id = String::with_capacity(GENERATED_ID_PREFIX.len() + normalized.len());
    id.push_str(GENERATED_ID_PREFIX);
    id.extend(normalized.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }));
    id
}

pub fn is_generated_id(product_id: &str) -> bool {
    product_id.starts_with(GENERATED_ID_PREFIX)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub catalog_id: String,
    pub display_name: String,
}

/// Normalized product name to external catalog id, for one business.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    by_name: HashMap<String, CatalogEntry>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog item. The first id seen for a normalized name is kept.
    pub fn insert(&mut self, display_name: &str, catalog_id: impl Into<String>) {
        let key = normalize_name(display_name);
        if key.is_empty() {
            return;
        }
        self.by_name.entry(key).or_insert_with(|| CatalogEntry {
            catalog_id: catalog_id.into(),
            display_name: display_name.trim().to_string(),
        });
    }

    pub fn lookup(&self, name: &str) -> Option<&CatalogEntry> {
        self.by_name.get(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Fills in names this snapshot does not know from `other`.
    pub fn merge(&mut self, other: &CatalogSnapshot) {
        for (key, entry) in &other.by_name {
            self.by_name.entry(key.clone()).or_insert_with(|| entry.clone());
        }
    }

    /// Rebuilds the identities already settled in the ledger: every stored
    /// product whose id is not a generated one came from a catalog.
    pub fn from_known_products(products: &[KnownProduct]) -> Self {
        let mut snapshot = Self::new();
        for product in products.iter().filter(|p| !is_generated_id(&p.product_id)) {
            snapshot.insert(&product.product_name, product.product_id.clone());
        }
        snapshot
    }
}

/// A distinct (product id, product name) pair present in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownProduct {
    pub product_id: String,
    pub product_name: String,
}

/// Rewrite of every ledger row keyed by `from_product_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityMigration {
    pub from_product_id: String,
    pub to_product_id: String,
    pub product_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ProductIdentityResolver {
    catalog: CatalogSnapshot,
}

impl ProductIdentityResolver {
    pub fn new(catalog: CatalogSnapshot) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    pub fn resolve(&self, name: &str) -> String {
        match self.catalog.lookup(name) {
            Some(entry) => entry.catalog_id.clone(),
            None => generated_id(name),
        }
    }

    /// Lists the generated ids in `known` that the catalog now owns.
    pub fn plan_migration(&self, known: &[KnownProduct]) -> Vec<IdentityMigration> {
        let mut seen = HashSet::new();
        let mut migrations = Vec::new();

        for product in known.iter().filter(|p| is_generated_id(&p.product_id)) {
            let Some(entry) = self.catalog.lookup(&product.product_name) else {
                continue;
            };
            if entry.catalog_id == product.product_id
                || !seen.insert(product.product_id.clone())
            {
                continue;
            }
            migrations.push(IdentityMigration {
                from_product_id: product.product_id.clone(),
                to_product_id: entry.catalog_id.clone(),
                product_name: product.product_name.clone(),
            });
        }

        migrations
    }
}
