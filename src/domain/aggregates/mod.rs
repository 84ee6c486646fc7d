//! Aggregates module
pub mod cart;
pub mod discount;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartItem, CartKey};
pub use discount::{Discount, DiscountError, DiscountUsage, DiscountValueType};
pub use order::{Order, OrderError, OrderLine, OrderStatus, PaymentMethod, StatusEntry};
pub use product::{Product, ProductError, Variant};
pub use user::{Address, Role, User};
