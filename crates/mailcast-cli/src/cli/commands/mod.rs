mod dispatch;
mod recipients;
mod status;
mod test_email;
mod worker;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("mailcast")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .help("Directory holding default.toml and environment overrides")
                .env("MAILCAST_CONFIG_DIR")
                .default_value("./config")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(dispatch::command())
        .subcommand(status::command())
        .subcommand(worker::command())
        .subcommand(recipients::command())
        .subcommand(test_email::command())
}
