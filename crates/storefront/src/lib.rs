//! VentHub Storefront library.
//!
//! The client-side orchestration layer of the VentHub storefront. All
//! persistence, authentication and pricing rules live in Supabase; this
//! crate drives the flows that span the backend and the user's device:
//!
//! - [`services::checkout`] - multi-step checkout and hosted payment hand-off
//! - [`services::watcher`] - pending order polling until payment resolves
//! - [`services::cart`] - local cart and guest/server merge on login
//! - [`services::payment_result`] - the payment return page logic
//!
//! The host (a terminal, a webview, a test) plugs in through the traits in
//! [`host`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod host;
pub mod services;
pub mod state;
pub mod storage;
pub mod supabase;

#[cfg(test)]
pub(crate) mod testing;
