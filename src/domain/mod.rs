//! Domain records and value objects.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod user;
pub mod value_objects;

pub use cart::{CartEntry, CartLine, CartView};
pub use catalog::{Category, Product, Review};
pub use order::{Order, OrderItem};
pub use user::User;
pub use value_objects::Money;
