//! VentHub Core - Shared domain types.
//!
//! This crate provides the types shared by every VentHub storefront component:
//! - `storefront` - Checkout orchestration, payment reconciliation and cart sync
//! - `cli` - Terminal front end for the storefront flows
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage access. The Supabase backend owns every authoritative
//! record; these types are the client's transient view of them.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, order status, money, cart lines and the pending order marker

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
