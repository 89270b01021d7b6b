//! Market data: ticker universe, providers, fetching, and alignment.

pub mod align;
pub mod circuit_breaker;
pub mod csv_import;
pub mod download;
pub mod interval;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use align::{align_prices, AlignError, DroppedColumn, PricePanel, ReturnPanel};
pub use circuit_breaker::CircuitBreaker;
pub use csv_import::CsvProvider;
pub use download::{fetch_prices, FetchError, FetchRequest, FetchedPrices, PriceSeries};
pub use interval::{Interval, PriceField};
pub use provider::{
    DataError, DataProvider, DataSource, FetchProgress, FetchResult, FetchWindow, LogProgress,
    RawBar,
};
pub use universe::{resolve, TickerSource, UniverseError};
pub use yahoo::YahooProvider;
