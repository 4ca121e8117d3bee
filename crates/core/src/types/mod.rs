//! Core types for VentHub.
//!
//! This module provides type-safe wrappers for the domain concepts the
//! storefront client reads from and writes to the backend.

pub mod cart;
pub mod id;
pub mod marker;
pub mod price;
pub mod status;

pub use cart::{CartItem, ProductSnapshot};
pub use id::*;
pub use marker::PendingOrderMarker;
pub use price::{CurrencyCode, Price, round_money};
pub use status::*;
