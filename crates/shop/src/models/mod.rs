//! Domain models shared by the storefront and admin services.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod order;

pub use cart::{Cart, CartLine};
pub use catalog::{FoodItem, NewFoodItem};
pub use customer::Customer;
pub use order::{DeliveryInfo, Order, OrderDetail, OrderItem, StatusHistoryEntry};
