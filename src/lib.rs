//! # ESP-AT MQTT client
//!
//! Blocking MQTT 3.1.1 client for WIFI modems running the ESP-AT firmware. The modem is attached by
//! UART, with the receive side written into a circular buffer by DMA.
//!
//! * [ring]: Read cursor into the circular DMA buffer
//! * [engine]: Synchronous AT command/response engine
//! * [codec]: MQTT packet encoding and decoding
//! * [ipd]: Reassembly of `+IPD` frames
//! * [wifi]: Central [wifi::Adapter] type, joining WIFI networks
//! * [mqtt]: MQTT operations of the adapter
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub mod buffer;
pub(crate) mod clock;
pub mod codec;
pub(crate) mod commands;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "examples")]
pub mod example;
pub(crate) mod hex;
pub mod ipd;
pub mod mqtt;
pub(crate) mod responses;
pub mod ring;
pub mod wifi;

#[cfg(test)]
mod tests;
