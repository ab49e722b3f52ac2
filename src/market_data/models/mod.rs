pub mod bar;
pub mod quote;
pub mod range;

pub use bar::{Bar, BarIdentity, CachedBar};
pub use quote::PriceQuote;
pub use range::{DateWindow, HistoricalRange};
