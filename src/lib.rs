#![recursion_limit = "256"]

//! CTPN text-line detection: anchor generation, anchor target
//! assignment, proposal decoding, loss assembly and the burn
//! network that ties them together.
//!
//! Layers, outermost first:
//!
//!   1. cli          - clap command line
//!   2. application  - use cases
//!   3. domain       - boxes, configuration, errors, traits
//!   4. rpn / data   - anchor machinery; tensor dumps
//!   5. ml           - burn network and losses
//!   6. infra        - configuration persistence

pub mod cli;
pub mod application;
pub mod domain;
pub mod rpn;
pub mod data;
pub mod ml;
pub mod infra;

pub use domain::{
    boxes::{BBox, BoxDelta, GtBox, ImageInfo, Proposal},
    config::CtpnConfig,
    error::CtpnError,
};
pub use ml::{loss::RpnLoss, model::Ctpn};
