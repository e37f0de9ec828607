//! Market event log reconstruction and order book replay.
//!
//! This crate turns the raw B3 dumps of one trading session (trade prints plus
//! buy and sell order lifecycle records) into a compact binary event file and
//! replays that file into a live limit-order book:
//!
//! - `moment`: packed date/time value and its text parsers
//! - `record`: header, trade, order and the `Event` sum type
//! - `parse`: fixed-width dump parsing and front-month symbol resolution
//! - `merge`: chronological total order across trades and both order sides
//! - `stream`: tag-linked binary event file writer and reader
//! - `book`: order book index keyed by order number and by side/price
//! - `simulator`: forward-only replay driving the book and user handlers
//! - `convert`: the dump-to-event-file pipeline used by the converter binary
//!
//! The binaries in this repository (`src/main.rs` and `src/bin/player.rs`)
//! are thin command-line wrappers over `convert` and `simulator`.
pub mod book;
pub mod convert;
pub mod error;
pub mod merge;
pub mod moment;
pub mod parse;
pub mod record;
pub mod simulator;
pub mod stream;

pub use error::{Error, Result};
