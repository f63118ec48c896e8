pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, command_argument_builder};
pub use handlers::{build_config, handle_crawl, write_report};

pub use orgcrawl_core::crawl::{CrawlOptions, CrawlOutput, CrawlProgressCallback, execute_crawl};
