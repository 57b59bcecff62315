use std::collections::HashMap;

use crate::identity::{CatalogSnapshot, ProductIdentityResolver};
use crate::sync::wire::{CatalogObject, OrderLineItem, OBJECT_TYPE_ITEM, OBJECT_TYPE_ITEM_VARIATION};

/// Per-run lookup from catalog references to parent items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogIndex {
    item_names: HashMap<String, String>,
    variation_items: HashMap<String, String>,
}

/// Product identity chosen for one order line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProduct {
    pub product_id: String,
    pub product_name: String,
}

impl CatalogIndex {
    pub fn from_objects(objects: &[CatalogObject]) -> Self {
        let mut index = Self::default();
        for object in objects {
            index.register(object, None);
        }
        index
    }

    fn register(&mut self, object: &CatalogObject, parent_item: Option<&str>) {
        match object.object_type.as_str() {
            OBJECT_TYPE_ITEM => {
                let Some(item_data) = object.item_data.as_ref() else {
                    return;
                };
                if let Some(name) = item_data.name.as_deref().filter(|n| !n.trim().is_empty()) {
                    self.item_names.insert(object.id.clone(), name.trim().to_string());
                }
                for variation in &item_data.variations {
                    self.register(variation, Some(&object.id));
                }
            }
            OBJECT_TYPE_ITEM_VARIATION => {
                let item_id = object
                    .item_variation_data
                    .as_ref()
                    .and_then(|data| data.item_id.as_deref())
                    .or(parent_item);
                if let Some(item_id) = item_id {
                    self.variation_items.insert(object.id.clone(), item_id.to_string());
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_names.is_empty() && self.variation_items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.item_names.len()
    }

    pub fn item_name(&self, item_id: &str) -> Option<&str> {
        self.item_names.get(item_id).map(String::as_str)
    }

    pub fn parent_item(&self, variation_id: &str) -> Option<&str> {
        self.variation_items.get(variation_id).map(String::as_str)
    }

    /// Item names keyed for the identity resolver.
    pub fn to_snapshot(&self) -> CatalogSnapshot {
        let mut items = self.item_names.iter().collect::<Vec<_>>();
        items.sort();
        let mut snapshot = CatalogSnapshot::new();
        for (item_id, name) in items {
            snapshot.insert(name, item_id.clone());
        }
        snapshot
    }

    /// Variation reference to parent item, then the reference taken as an
    /// item id, then the line's own label through `resolver`.
    pub fn resolve_line(
        &self,
        line: &OrderLineItem,
        resolver: &ProductIdentityResolver,
    ) -> ResolvedProduct {
        let line_name = line.name.as_deref().map(str::trim).unwrap_or_default();

        if let Some(reference) = line.catalog_object_id.as_deref().filter(|r| !r.is_empty()) {
            let item_id = self.parent_item(reference).unwrap_or(reference);
            let product_name = self.item_name(item_id).unwrap_or(line_name).to_string();
            return ResolvedProduct { product_id: item_id.to_string(), product_name };
        }

        ResolvedProduct {
            product_id: resolver.resolve(line_name),
            product_name: line_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogIndex;
    use crate::identity::ProductIdentityResolver;
    use crate::sync::wire::{
        CatalogObject, ItemData, ItemVariationData, OrderLineItem, OBJECT_TYPE_ITEM,
        OBJECT_TYPE_ITEM_VARIATION,
    };

    fn variation(id: &str, item_id: Option<&str>) -> CatalogObject {
        CatalogObject {
            id: id.to_string(),
            object_type: OBJECT_TYPE_ITEM_VARIATION.to_string(),
            item_data: None,
            item_variation_data: Some(ItemVariationData {
                item_id: item_id.map(str::to_string),
                ..ItemVariationData::default()
            }),
        }
    }

    fn item(id: &str, name: &str, variations: Vec<CatalogObject>) -> CatalogObject {
        CatalogObject {
            id: id.to_string(),
            object_type: OBJECT_TYPE_ITEM.to_string(),
            item_data: Some(ItemData { name: Some(name.to_string()), variations }),
            item_variation_data: None,
        }
    }

    fn line(reference: Option<&str>, name: &str) -> OrderLineItem {
        OrderLineItem {
            catalog_object_id: reference.map(str::to_string),
            name: Some(name.to_string()),
            quantity: "1".to_string(),
            base_price_money: None,
        }
    }

    fn index() -> CatalogIndex {
        CatalogIndex::from_objects(&[
            item("ITEM_LATTE", "Latte", vec![variation("VAR_LATTE_L", None)]),
            variation("VAR_LATTE_S", Some("ITEM_LATTE")),
            item("ITEM_SCONE", "Scone", Vec::new()),
        ])
    }

    #[test]
    fn variations_resolve_to_their_parent_item_name() {
        let resolver = ProductIdentityResolver::default();
        let index = index();
        for reference in ["VAR_LATTE_L", "VAR_LATTE_S"] {
            let resolved = index.resolve_line(&line(Some(reference), "Latte - Large"), &resolver);
            assert_eq!(resolved.product_id, "ITEM_LATTE");
            assert_eq!(resolved.product_name, "Latte");
        }
    }

    #[test]
    fn unknown_reference_is_taken_as_the_item() {
        let resolved = index()
            .resolve_line(&line(Some("ITEM_SCONE"), "scone"), &ProductIdentityResolver::default());
        assert_eq!(resolved.product_id, "ITEM_SCONE");
        assert_eq!(resolved.product_name, "Scone");

        let resolved = CatalogIndex::default()
            .resolve_line(&line(Some("VAR_GONE"), "Mystery"), &ProductIdentityResolver::default());
        assert_eq!(resolved.product_id, "VAR_GONE");
        assert_eq!(resolved.product_name, "Mystery");
    }

    #[test]
    fn lines_without_reference_go_through_the_resolver() {
        let index = index();
        let resolver = ProductIdentityResolver::new(index.to_snapshot());

        let matched = index.resolve_line(&line(None, " latte "), &resolver);
        assert_eq!(matched.product_id, "ITEM_LATTE");

        let custom = index.resolve_line(&line(None, "Custom Amount"), &resolver);
        assert_eq!(custom.product_id, "gen_custom_amount");
        assert_eq!(index.item_count(), 2);
    }
}
