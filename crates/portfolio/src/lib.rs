//! Cross-sectional rebalancing and pairs trading on a shared
//! move-to-target primitive.

pub mod basket;
pub mod book;
pub mod pairs;
pub mod rebalancer;
pub mod scores;

pub use basket::{decile_weights, UniverseBasket};
pub use book::TargetBook;
pub use pairs::PairsTrading;
pub use rebalancer::Rebalancer;
pub use scores::{
    provider_for, ExternalScores, LowVolatilityScore, MomentumScore, ReversalScore, ScoreProvider,
};
