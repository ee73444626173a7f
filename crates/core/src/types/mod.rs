//! Domain types for Campus Eats.
//!
//! Type-safe wrappers for ids, contact details, order numbers and the
//! order/payment status machines.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod phone;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{loyalty_points_for, payable_whole_units};
pub use order_number::{OrderNumber, OrderNumberError};
pub use phone::{PhoneNumber, PhoneNumberError};
pub use status::*;
