//! Business logic on top of the store and the payment gateway.
//!
//! - [`CartService`] - single-category carts with live prices
//! - [`OrderService`] - checkout, payment reconciliation and fulfillment
//! - [`CatalogService`] - menu reads and staff edits
//!
//! Cart edits and checkout for one customer are serialised through a shared
//! [`CustomerLocks`]; different customers never wait on each other.

pub mod cart;
pub mod catalog;
pub mod locks;
pub mod orders;

pub use cart::{CartLineView, CartService, CartSummary, MAX_LINE_QUANTITY};
pub use catalog::CatalogService;
pub use locks::CustomerLocks;
pub use orders::{
    CancelledBy, CustomerOrders, MAX_LISTING_LIMIT, NoOpReason, OrderService, PlaceOrderRequest,
    PlacedOrder, ReconcileOutcome, StaleSweepReport,
};
