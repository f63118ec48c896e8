pub mod config;
pub mod crawl;
pub mod csv;
pub mod hierarchy;
pub mod report;
pub mod resolve;
pub mod session;
pub mod sink;
pub mod stage;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
   ___  _ __ __ _  ___ _ __ __ ___      _| |
  / _ \| '__/ _` |/ __| '__/ _` \ \ /\ / / |
 | (_) | | | (_| | (__| | | (_| |\ V  V /| |
  \___/|_|  \__, |\___|_|  \__,_| \_/\_/ |_|
            |___/
"#;
    println!("{}", banner.cyan());
    println!(
        "  {} v{}\n",
        "government directory crawler".dimmed(),
        env!("CARGO_PKG_VERSION")
    );
}
