//! # Blanket Order Sample
//!
//! A small purchasing domain on top of `data-portal`: blanket orders with a
//! delivery address and order items, a read-only order list and a command
//! that clears an order's schedules. Data lives in an in-memory database.
//!
//! This library exposes the modules for the demo binary and the integration
//! tests.

pub mod dao;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod storage;
