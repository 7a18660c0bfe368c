use clap::{Arg, Command};

pub fn command() -> Command {
    Command::new("worker")
        .about("Process queued send and bulk dispatch jobs until interrupted")
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .help("Jobs executed at once [default: jobs.worker.concurrency]")
                .value_parser(clap::value_parser!(usize)),
        )
}
