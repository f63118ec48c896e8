pub mod client;
pub mod directory;
pub mod error;
pub mod extract;
pub mod model;
pub mod rate;

pub use client::{FetchPolicy, PortalClient};
pub use directory::{DirectoryFetcher, DirectoryListing, ListingQuery, PageRows};
pub use error::{ExtractionError, FetchError, RaggedPageError};
pub use extract::{DetailPage, LeaderRecord, Shape, ShapeRules, UnitRecord};
pub use model::{Category, DirectoryRow, UnitKind};
pub use rate::RateLimiter;
