use clap::{Arg, Command};
use std::path::PathBuf;

pub fn command() -> Command {
    Command::new("test-email")
        .about("Send the current template to a single address before a mass dispatch")
        .arg(
            Arg::new("to")
                .short('e')
                .long("to")
                .help("Destination address [default: smtp.sender]"),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .help("Rendered HTML template [default: newest in dispatch.template_dir]")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}
