//! Typed domain model backing the storefront tables.

pub mod catalog;
pub mod discount;
pub mod order;
pub mod payment;

pub use catalog::{Address, Product, ProductVariant, ResolvedVariant};
pub use discount::{Discount, DiscountType, DiscountUsage, Inapplicable};
pub use order::{Order, OrderItem, OrderStatus, OrderStatusHistory, PaymentStatus};
pub use payment::{Payment, PaymentProvider};
