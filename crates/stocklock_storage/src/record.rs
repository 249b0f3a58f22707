//! Versioned record model.
//!
//! Both record kinds carry a [`Version`] that starts at
//! [`Version::INITIAL`] and is bumped by exactly one on every committed
//! write. Fields are readable by anyone but only the backend that owns a
//! record can change its version.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Monotonic per-record version counter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version assigned to a freshly created record.
    pub const INITIAL: Self = Self(0);

    /// Creates a version from its raw value.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the version that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A quantity-bearing entity guarded by a version counter.
pub trait VersionedRecord: Clone + fmt::Debug + Send + Sync + 'static {
    /// Backend-native identifier.
    type Id: Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Partial field update accepted by [`VersionedRecord::apply_patch`].
    type Patch: fmt::Debug + Send + Sync;

    /// Short name of the record kind, used in logs.
    const KIND: &'static str;

    /// Returns the record identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the version this copy was read at.
    fn version(&self) -> Version;

    /// Returns the countable quantity (stock or on-hand quantity).
    fn quantity(&self) -> u32;

    /// Replaces the quantity on this in-memory copy.
    fn set_quantity(&mut self, quantity: u32);

    /// Applies a patch to this in-memory copy.
    ///
    /// Either every field in the patch is applied or, if any value is
    /// rejected, the copy is left unchanged.
    fn apply_patch(&mut self, patch: &Self::Patch) -> StorageResult<()>;
}

pub(crate) fn validate_price(price: f64) -> StorageResult<f64> {
    if !price.is_finite() {
        return Err(StorageError::invalid_field("price", "must be a finite number"));
    }
    if price < 0.0 {
        return Err(StorageError::invalid_field(
            "price",
            format!("must be non-negative, got {price}"),
        ));
    }
    Ok(price)
}

// === Product (relational) ===

/// Auto-increment identifier of a [`Product`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl ProductId {
    /// Creates a product ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product:{}", self.0)
    }
}

/// A product row with a stock count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub(crate) id: ProductId,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) price: f64,
    pub(crate) stock: u32,
    pub(crate) version: Version,
}

impl Product {
    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the unit price.
    #[must_use]
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the stock count.
    #[must_use]
    pub fn stock(&self) -> u32 {
        self.stock
    }
}

impl VersionedRecord for Product {
    type Id = ProductId;
    type Patch = ProductPatch;

    const KIND: &'static str = "product";

    fn id(&self) -> &ProductId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn quantity(&self) -> u32 {
        self.stock
    }

    fn set_quantity(&mut self, quantity: u32) {
        self.stock = quantity;
    }

    fn apply_patch(&mut self, patch: &ProductPatch) -> StorageResult<()> {
        let price = patch.price.map(validate_price).transpose()?;
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(price) = price {
            self.price = price;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        Ok(())
    }
}

/// Field values for a product that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Unit price.
    pub price: f64,
    /// Initial stock.
    pub stock: u32,
}

impl NewProduct {
    /// Creates a new product draft with an empty description.
    pub fn new(name: impl Into<String>, price: f64, stock: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            stock,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Partial update of a product. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New unit price.
    pub price: Option<f64>,
    /// New stock count.
    pub stock: Option<u32>,
}

impl ProductPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the price.
    #[must_use]
    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the stock count.
    #[must_use]
    pub fn stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
    }
}

// === Inventory (document) ===

/// String identifier of an [`Inventory`] document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryId(pub String);

impl InventoryId {
    /// Creates an inventory ID from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random inventory ID.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InventoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inventory:{}", self.0)
    }
}

/// An inventory document with an on-hand quantity.
///
/// Serialized field names follow the document store's conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(rename = "_id")]
    pub(crate) id: InventoryId,
    #[serde(rename = "itemName")]
    pub(crate) item_name: String,
    pub(crate) category: String,
    pub(crate) price: f64,
    pub(crate) quantity: u32,
    pub(crate) version: Version,
}

impl Inventory {
    /// Returns the item name.
    #[must_use]
    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// Returns the category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Returns the unit price.
    #[must_use]
    pub fn price(&self) -> f64 {
        self.price
    }
}

impl VersionedRecord for Inventory {
    type Id = InventoryId;
    type Patch = InventoryPatch;

    const KIND: &'static str = "inventory";

    fn id(&self) -> &InventoryId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }

    fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
    }

    fn apply_patch(&mut self, patch: &InventoryPatch) -> StorageResult<()> {
        let price = patch.price.map(validate_price).transpose()?;
        if let Some(item_name) = &patch.item_name {
            self.item_name.clone_from(item_name);
        }
        if let Some(category) = &patch.category {
            self.category.clone_from(category);
        }
        if let Some(price) = price {
            self.price = price;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        Ok(())
    }
}

/// Field values for an inventory document that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInventory {
    /// Caller-chosen identifier; a random one is generated when absent.
    pub id: Option<InventoryId>,
    /// Item name.
    pub item_name: String,
    /// Category label.
    pub category: String,
    /// Unit price.
    pub price: f64,
    /// Initial quantity.
    pub quantity: u32,
}

impl NewInventory {
    /// Creates a new inventory draft with an empty category.
    pub fn new(item_name: impl Into<String>, price: f64, quantity: u32) -> Self {
        Self {
            id: None,
            item_name: item_name.into(),
            category: String::new(),
            price,
            quantity,
        }
    }

    /// Sets an explicit identifier.
    #[must_use]
    pub fn with_id(mut self, id: InventoryId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Partial update of an inventory document. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryPatch {
    /// New item name.
    pub item_name: Option<String>,
    /// New category.
    pub category: Option<String>,
    /// New unit price.
    pub price: Option<f64>,
    /// New quantity.
    pub quantity: Option<u32>,
}

impl InventoryPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the item name.
    #[must_use]
    pub fn item_name(mut self, item_name: impl Into<String>) -> Self {
        self.item_name = Some(item_name.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the price.
    #[must_use]
    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the quantity.
    #[must_use]
    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }
}
