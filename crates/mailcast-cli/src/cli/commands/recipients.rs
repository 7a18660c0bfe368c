use clap::{Arg, ArgGroup, Command};
use std::path::PathBuf;

fn index_arg() -> Arg {
    Arg::new("index")
        .help("Position shown by `mailcast recipients list` (starting at 1)")
        .required(true)
        .value_parser(clap::value_parser!(u64).range(1..))
}

pub fn command() -> Command {
    Command::new("recipients")
        .about("Maintain the recipient list")
        .subcommand_required(true)
        .arg(
            Arg::new("file")
                .long("file")
                .help("Recipient CSV file [default: dispatch.recipients_path]")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(Command::new("list").about("Show every recipient"))
        .subcommand(
            Command::new("add")
                .about("Append a recipient")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("edit")
                .about("Change the name or address of a recipient")
                .arg(index_arg())
                .arg(Arg::new("name").long("name"))
                .arg(Arg::new("email").long("email"))
                .group(
                    ArgGroup::new("changes")
                        .args(["name", "email"])
                        .multiple(true)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a recipient")
                .arg(index_arg()),
        )
        .subcommand(
            Command::new("import")
                .about("Merge recipients from another name,email CSV file")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Write the recipient list to another CSV file")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_starts_at_one() {
        assert!(command()
            .try_get_matches_from(["recipients", "remove", "0"])
            .is_err());
        assert!(command()
            .try_get_matches_from(["recipients", "remove", "1"])
            .is_ok());
    }

    #[test]
    fn test_edit_needs_a_change() {
        assert!(command()
            .try_get_matches_from(["recipients", "edit", "2"])
            .is_err());

        let matches = command()
            .try_get_matches_from(["recipients", "edit", "2", "--email", "new@example.org"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "edit");
        assert_eq!(sub.get_one::<u64>("index").copied(), Some(2));
        assert!(sub.get_one::<String>("name").is_none());
    }
}
