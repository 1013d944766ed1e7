//! External collaborators: market data source and the live venue
//! client. Both are thin, narrow interfaces; everything above them is
//! backend-agnostic.

mod market_data;
mod types;
mod venue_client;

pub use market_data::{BinanceClient, MarketData, ReplayFeed};
pub use types::{VenueBalance, VenueOrder, VenuePosition};
pub use venue_client::VenueClient;
