use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

pub fn command() -> Command {
    Command::new("dispatch")
        .about("Send the latest rendered template to every recipient")
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .help("async submits a background job; sync sends from this process")
                .value_parser(["async", "sync"])
                .default_value("async"),
        )
        .arg(
            Arg::new("delay")
                .short('d')
                .long("delay")
                .help("Seconds between consecutive sends [default: dispatch.default_delay_secs]")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .help("Only send to the first N recipients (0 = everyone)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("simulate")
                .long("simulate")
                .help("Go through the whole dispatch without contacting the SMTP relay")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("recipients")
                .long("recipients")
                .help("Recipient CSV file [default: dispatch.recipients_path]")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .help("Rendered HTML template [default: newest in dispatch.template_dir]")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .help("Skip the confirmation prompt of a synchronous dispatch")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matches = command().try_get_matches_from(["dispatch"]).unwrap();
        assert_eq!(
            matches.get_one::<String>("mode").map(String::as_str),
            Some("async")
        );
        assert!(matches.get_one::<u64>("delay").is_none());
        assert!(!matches.get_flag("simulate"));
        assert!(!matches.get_flag("yes"));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(command()
            .try_get_matches_from(["dispatch", "--mode", "later"])
            .is_err());
    }

    #[test]
    fn test_all_options() {
        let matches = command()
            .try_get_matches_from([
                "dispatch",
                "-m",
                "sync",
                "-d",
                "2",
                "-l",
                "10",
                "--simulate",
                "--recipients",
                "members.csv",
                "--template",
                "out.html",
                "-y",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<u64>("delay").copied(), Some(2));
        assert_eq!(matches.get_one::<usize>("limit").copied(), Some(10));
        assert!(matches.get_flag("simulate"));
        assert!(matches.get_flag("yes"));
        assert_eq!(
            matches.get_one::<PathBuf>("recipients"),
            Some(&PathBuf::from("members.csv"))
        );
    }
}
