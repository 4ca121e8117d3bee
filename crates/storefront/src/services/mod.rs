//! Business logic services for the storefront client.
//!
//! # Services
//!
//! - `cart` - Local cart, server mirroring and the guest/server merge on login
//! - `checkout` - Multi-step checkout, payment initiation and form hand-off
//! - `watcher` - Pending order polling until payment settles
//! - `payment_result` - The payment return page
//!
//! Every service talks to Supabase through [`crate::supabase::Backend`] and
//! to local storage through [`crate::storage::ClientStorage`]. Both are
//! shared: the cart, checkout and watcher all see the same pending order
//! marker.

pub mod cart;
pub mod checkout;
pub mod payment_result;
pub mod watcher;
