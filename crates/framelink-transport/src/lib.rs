//! # framelink-transport
//!
//! Framelink reliable frame sender.
//!
//! Splits producer frames into fixed-size fragments, transmits them over
//! an external datagram [`net::NetworkManager`], merges per-fragment ack
//! bitmaps from the receiver, and selectively retransmits what is still
//! missing — while a flush-flagged frame can preempt the one in flight.
//!
//! ## Crate structure
//!
//! - [`wire`] — fragment header and ack packet serialization
//! - [`bitmap`] — 128-bit fragment bitmaps (ack + to-send)
//! - [`net`] — datagram transport capability trait
//! - [`queue`] — bounded pending-frame queue with priority-aware pop
//! - [`config`] — sender tunables
//! - [`error`] — error taxonomy
//! - [`stats`] — counters and the efficiency window
//! - [`sender`] — public API and the two worker loops

pub mod bitmap;
pub mod config;
pub mod error;
pub mod net;
pub mod queue;
pub mod sender;
pub mod stats;
pub mod wire;

mod state;
