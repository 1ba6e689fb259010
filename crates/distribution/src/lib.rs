//! Scarcity-aware distribution of central supply across competing stores.

pub mod dpdu;

pub use dpdu::{
    DistributionConflict, DistributionRequest, DistributionResult, DistributionStatus,
    StoreAllocation, StoreDemand, StoreShortfall, distribute, distribute_many,
};
