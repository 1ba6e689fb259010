//! `invintel-policy`
//!
//! Converts a classification plus demand statistics into stock levels:
//! minimum, safety, maximum, reorder point and suggested order.

pub mod calculator;

pub use calculator::{
    PolicyBasis, PolicyBatch, PolicyInput, StockPolicy, compute_policies, compute_stock_policy,
    round_up_to_pack,
};
