//! Cache key definitions.
//!
//! Every cached read belongs to a [`ViewFamily`]. A [`View`] names one concrete
//! entry of a family and derives its key deterministically from its parameters.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::listing::ListQuery;
use crate::domain::types::ProductId;

/// Group of keys that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewFamily {
    FeaturedProducts,
    Categories,
    ProductDetail,
    ProductStock,
    ProductsList,
}

impl ViewFamily {
    pub const ALL: [ViewFamily; 5] = [
        ViewFamily::FeaturedProducts,
        ViewFamily::Categories,
        ViewFamily::ProductDetail,
        ViewFamily::ProductStock,
        ViewFamily::ProductsList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ViewFamily::FeaturedProducts => "featured_products",
            ViewFamily::Categories => "categories",
            ViewFamily::ProductDetail => "product_detail",
            ViewFamily::ProductStock => "product_stock",
            ViewFamily::ProductsList => "products_list",
        }
    }

    /// Recover the family from a key built by [`View::key`].
    pub fn from_key(key: &ViewKey) -> Option<Self> {
        let name = key.as_str().split(':').next()?;
        Self::ALL.into_iter().find(|family| family.name() == name)
    }
}

impl fmt::Display for ViewFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical cache key, without the store prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewKey(String);

impl ViewKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered parameter set folded into a key.
///
/// Entries are kept sorted, so insertion order never affects the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams(BTreeMap<&'static str, String>);

impl ViewParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, value: impl ToString) -> &mut Self {
        self.0.insert(name, value.to_string());
        self
    }

    /// Insert only when a value is present; absent and unset are the same key.
    pub fn insert_opt<T: ToString>(&mut self, name: &'static str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    /// Hex SHA-256 over length-prefixed name/value pairs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.0 {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl From<&ListQuery> for ViewParams {
    fn from(query: &ListQuery) -> Self {
        let mut params = ViewParams::new();
        params
            .insert_opt("category_id", query.category_id)
            .insert_opt("search", query.search.as_deref())
            .insert("in_stock_only", query.in_stock_only)
            .insert("page", query.page)
            .insert("per_page", query.per_page)
            .insert("sort_by", query.sort_by.as_str())
            .insert("sort_order", query.sort_order.as_str());
        params
    }
}

/// One concrete cached read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    FeaturedProducts,
    Categories,
    ProductDetail(ProductId),
    ProductStock(ProductId),
    ProductsList(ListQuery),
}

impl View {
    pub fn family(&self) -> ViewFamily {
        match self {
            View::FeaturedProducts => ViewFamily::FeaturedProducts,
            View::Categories => ViewFamily::Categories,
            View::ProductDetail(_) => ViewFamily::ProductDetail,
            View::ProductStock(_) => ViewFamily::ProductStock,
            View::ProductsList(_) => ViewFamily::ProductsList,
        }
    }

    pub fn key(&self) -> ViewKey {
        match self {
            View::FeaturedProducts | View::Categories => ViewKey(self.family().name().to_string()),
            View::ProductDetail(id) | View::ProductStock(id) => entity_key(self.family(), *id),
            View::ProductsList(query) => {
                build_key(ViewFamily::ProductsList, &ViewParams::from(query))
            }
        }
    }
}

/// Key of a per-entity view, e.g. `product_detail:42`.
pub fn entity_key(family: ViewFamily, id: i64) -> ViewKey {
    ViewKey(format!("{}:{id}", family.name()))
}

/// Key of a parameterised view: `{family}:{fingerprint}`.
pub fn build_key(family: ViewFamily, params: &ViewParams) -> ViewKey {
    ViewKey(format!("{}:{}", family.name(), params.fingerprint()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::{SortField, SortOrder};

    #[test]
    fn singleton_and_entity_keys_are_readable() {
        assert_eq!(View::FeaturedProducts.key().as_str(), "featured_products");
        assert_eq!(View::Categories.key().as_str(), "categories");
        assert_eq!(View::ProductDetail(42).key().as_str(), "product_detail:42");
        assert_eq!(View::ProductStock(42).key().as_str(), "product_stock:42");
    }

    #[test]
    fn parameter_insertion_order_does_not_change_key() {
        let mut a = ViewParams::new();
        a.insert("category_id", 3).insert("search", "lamp");
        let mut b = ViewParams::new();
        b.insert("search", "lamp").insert("category_id", 3);

        assert_eq!(
            build_key(ViewFamily::ProductsList, &a),
            build_key(ViewFamily::ProductsList, &b)
        );
    }

    #[test]
    fn differing_parameters_produce_different_keys() {
        let base = ListQuery::default();
        let other_page = ListQuery {
            page: 2,
            ..Default::default()
        };
        let other_sort = ListQuery {
            sort_by: SortField::Price,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };

        let keys = [
            View::ProductsList(base).key(),
            View::ProductsList(other_page).key(),
            View::ProductsList(other_sort).key(),
        ];
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[0], keys[2]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn length_prefixing_separates_shifted_boundaries() {
        let mut a = ViewParams::new();
        a.insert("search", "ab").insert("sort_by", "c");
        let mut b = ViewParams::new();
        b.insert("search", "a").insert("sort_by", "bc");

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn equivalent_normalised_queries_share_a_key() {
        let blank = ListQuery {
            search: Some("  ".to_string()),
            ..Default::default()
        }
        .normalized();
        let absent = ListQuery::default().normalized();

        assert_eq!(
            View::ProductsList(blank).key(),
            View::ProductsList(absent).key()
        );
    }

    #[test]
    fn family_is_recovered_from_key() {
        let key = View::ProductsList(ListQuery::default()).key();
        assert!(key.as_str().starts_with("products_list:"));
        assert_eq!(ViewFamily::from_key(&key), Some(ViewFamily::ProductsList));
        assert_eq!(
            ViewFamily::from_key(&View::ProductStock(1).key()),
            Some(ViewFamily::ProductStock)
        );
        assert_eq!(ViewFamily::from_key(&ViewKey("bogus".to_string())), None);
    }
}
