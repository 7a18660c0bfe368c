use clap::{Arg, ArgAction, ArgGroup, Command};

pub fn command() -> Command {
    Command::new("status")
        .about("Show the state of a job handle or list active jobs")
        .arg(Arg::new("handle").help("Job handle printed by `mailcast dispatch`"))
        .arg(
            Arg::new("bulk")
                .short('b')
                .long("bulk")
                .help("Aggregate the send jobs scheduled by a bulk dispatch")
                .requires("handle")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List pending, running and retrying jobs")
                .conflicts_with("handle")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max")
                .long("max")
                .help("Maximum number of jobs listed")
                .default_value("50")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the report as JSON")
                .action(ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("target")
                .args(["handle", "list"])
                .required(true),
        )
}
