use clap::{arg, command};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    command!("orgcrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("orgcrawl")
        .about(
            "Crawl the Quzhou government information directory and write leaders, units and \
            the unit hierarchy to a workbook.",
        )
        .styles(CLAP_STYLING)
        .arg(
            arg!(<ENTRY>)
                .help("Portal entry: qz.gov.cn, www.qz.gov.cn or http://www.qz.gov.cn"),
        )
        .arg(arg!(<OUTFILE>).help("Workbook name; '.xlsx' is appended when missing"))
        .arg(
            arg!(-s --"storage" <DIR>)
                .required(false)
                .help("Directory holding the staging files while the workbook is built")
                .default_value("."),
        )
        .arg(
            arg!(--"every" <N>)
                .required(false)
                .help("Pause after every N requests (0 disables pausing)")
                .value_parser(clap::value_parser!(u32))
                .default_value("10"),
        )
        .arg(
            arg!(--"pause" <SECONDS>)
                .required(false)
                .help("Length of each pause in seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            arg!(--"retries" <N>)
                .required(false)
                .help("Retries for timeouts and server errors")
                .value_parser(clap::value_parser!(u32))
                .default_value("3"),
        )
        .arg(
            arg!(--"timeout" <SECONDS>)
                .required(false)
                .help("Request timeout in seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("20"),
        )
        .arg(
            arg!(--"separator" <CHAR>)
                .required(false)
                .help("Field separator of the staging files ('tab' or '\\t' for a tab)")
                .default_value("tab"),
        )
        .arg(
            arg!(--"cookie" <COOKIE>)
                .required(false)
                .help("Cookie header sent with every request"),
        )
        .arg(
            arg!(--"keep-staging")
                .required(false)
                .help("Keep the staging directory after the workbook is written")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(-r --"report" <PATH>)
                .required(false)
                .help("Save the run report to a file (.json for JSON, text otherwise)")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(arg!(-q --"quiet" "Suppress banner, progress and the run report").required(false))
}
