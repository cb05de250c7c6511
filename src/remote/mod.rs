//! Remote mirror support
//!
//! Only requests tagged `public` reach the mirror, and only when one is
//! configured.

mod client;
mod reconcile;

pub use client::MirrorClient;
pub use reconcile::*;
