//! Demo data services
//!
//! Two trivial services feed the demo page. One answers fetch requests and
//! sometimes fails; the other loads its data eagerly in the background.

pub mod countries;
pub mod feed;
