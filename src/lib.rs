//! OpenFlow 1.3 controller engine.
//!
//! Switch connections are accepted by `ofp_controller::OfpController`, driven by
//! `ofp_datapath`, and every decoded message is routed by `ofp_dispatch` to the registered
//! applications. The wire codec lives in `openflow0x04`.
pub mod app;
mod bits;
pub mod ofp_controller;
pub mod ofp_datapath;
pub mod ofp_dispatch;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow0x04;
pub mod packet;
