//! Property-based test generators using proptest.
//!
//! Provides strategies for generating record inputs, patches and
//! operation sequences, plus a reference model the sequences can be
//! checked against.

use proptest::prelude::*;
use stocklock_core::{CoreResult, ErrorKind, ProductService, Strategy as Mode};
use stocklock_storage::{InventoryPatch, NewInventory, NewProduct, ProductId, ProductPatch};

/// Strategy for generating prices the record model accepts.
pub fn price_strategy() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(|cents| f64::from(cents) / 100.0)
}

/// Strategy for generating prices the record model rejects.
pub fn invalid_price_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        (1u32..1_000_000).prop_map(|cents| -f64::from(cents) / 100.0),
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

/// Strategy for generating display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,11}( [a-z]{2,8})?").expect("Invalid regex")
}

/// Strategy for choosing a concurrency control mode.
pub fn mode_strategy() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Optimistic), Just(Mode::Pessimistic)]
}

/// Strategy for generating new products.
pub fn new_product_strategy() -> impl Strategy<Value = NewProduct> {
    (name_strategy(), price_strategy(), 0u32..1_000)
        .prop_map(|(name, price, stock)| NewProduct::new(name, price, stock))
}

/// Strategy for generating new inventory items without a fixed id.
pub fn new_inventory_strategy() -> impl Strategy<Value = NewInventory> {
    (name_strategy(), "[a-z]{3,8}", price_strategy(), 0u32..1_000).prop_map(
        |(item_name, category, price, quantity)| {
            NewInventory::new(item_name, price, quantity).category(category)
        },
    )
}

/// Strategy for generating valid product patches.
pub fn product_patch_strategy() -> impl Strategy<Value = ProductPatch> {
    (
        prop::option::of(name_strategy()),
        prop::option::of("[a-z ]{0,24}"),
        prop::option::of(price_strategy()),
        prop::option::of(0u32..1_000),
    )
        .prop_map(|(name, description, price, stock)| ProductPatch {
            name,
            description,
            price,
            stock,
        })
}

/// Strategy for generating valid inventory patches.
pub fn inventory_patch_strategy() -> impl Strategy<Value = InventoryPatch> {
    (
        prop::option::of(name_strategy()),
        prop::option::of("[a-z]{3,8}"),
        prop::option::of(price_strategy()),
        prop::option::of(0u32..1_000),
    )
        .prop_map(|(item_name, category, price, quantity)| InventoryPatch {
            item_name,
            category,
            price,
            quantity,
        })
}

/// A single store operation against one product.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Remove units.
    Decrease {
        /// Units to remove; may be zero or exceed stock.
        amount: u32,
        /// Concurrency control mode.
        mode: Mode,
    },
    /// Overwrite the stock count.
    SetStock {
        /// New stock.
        stock: u32,
        /// Concurrency control mode.
        mode: Mode,
    },
    /// Bump the version only.
    ForceIncrement,
}

/// Strategy for generating store operations.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => (0u32..8, mode_strategy())
            .prop_map(|(amount, mode)| StoreOp::Decrease { amount, mode }),
        1 => (0u32..20, mode_strategy())
            .prop_map(|(stock, mode)| StoreOp::SetStock { stock, mode }),
        1 => Just(StoreOp::ForceIncrement),
    ]
}

/// Strategy for generating a sequence of store operations.
pub fn op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOp>> {
    prop::collection::vec(store_op_strategy(), min_ops..max_ops)
}

/// Reference model of a single product under sequential operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockModel {
    /// Expected stock.
    pub stock: u32,
    /// Expected version.
    pub version: u64,
}

impl StockModel {
    /// Creates a model of a freshly created product.
    #[must_use]
    pub const fn new(stock: u32) -> Self {
        Self { stock, version: 0 }
    }

    /// Applies `op` and returns the error kind the store should report,
    /// if any.
    pub fn apply(&mut self, op: &StoreOp) -> Option<ErrorKind> {
        match *op {
            StoreOp::Decrease { amount: 0, .. } => Some(ErrorKind::InvalidArgument),
            StoreOp::Decrease { amount, .. } if amount > self.stock => {
                Some(ErrorKind::InsufficientQuantity)
            }
            StoreOp::Decrease { amount, .. } => {
                self.stock -= amount;
                self.version += 1;
                None
            }
            StoreOp::SetStock { stock, .. } => {
                self.stock = stock;
                self.version += 1;
                None
            }
            StoreOp::ForceIncrement => {
                self.version += 1;
                None
            }
        }
    }
}

/// Runs `op` against the product `id` held by `service`.
pub fn run_op(service: &ProductService, id: ProductId, op: &StoreOp) -> CoreResult<()> {
    match *op {
        StoreOp::Decrease { amount, mode } => service.decrease_stock(id, amount, mode).map(drop),
        StoreOp::SetStock { stock, mode } => service
            .update(id, &ProductPatch::new().stock(stock), mode)
            .map(drop),
        StoreOp::ForceIncrement => service.force_increment(id).map(drop),
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
