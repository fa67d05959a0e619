//! Player markets the scraper knows how to find on a game page.

use clap::ValueEnum;

/// Where a market lives on the game page and how it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSpec {
    /// Stored as `market_type`
    pub market_type: &'static str,
    /// Exact title of the tab holding the market
    pub tab_label: &'static str,
    /// Prefix of the section's `data-urn` attribute
    pub urn: &'static str,
}

pub const POINTS: MarketSpec = MarketSpec {
    market_type: "points",
    tab_label: "Jogador",
    urn: "ppb:tbd:cardgroup:pebble:marketTemplateEvent:ZxEDTxIAACIAf6YW",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Market {
    /// Player points lines
    Points,
}

impl Market {
    pub fn spec(self) -> &'static MarketSpec {
        match self {
            Market::Points => &POINTS,
        }
    }
}
