// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    let yes = Arg::new("yes")
        .short('y')
        .long("yes")
        .action(ArgAction::SetTrue)
        .help("Answer yes to every prompt");
    let config = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .global(true)
        .help("Path to a config file");

    Command::new("modkeep")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Modkeep Contributors")
        .about("Package manager for game modding setups")
        .arg(config)
        .subcommand(
            Command::new("install")
                .about("Install packages and their dependencies")
                .arg(
                    Arg::new("queries")
                        .required(true)
                        .num_args(1..)
                        .help("Package queries, e.g. skyui or skse>=1.7"),
                )
                .arg(
                    Arg::new("upgrade")
                        .short('u')
                        .long("upgrade")
                        .action(ArgAction::SetTrue)
                        .help("Upgrade the named packages if already installed"),
                )
                .arg(yes.clone()),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Installed package names"),
                )
                .arg(
                    Arg::new("no_deps")
                        .long("no-deps")
                        .action(ArgAction::SetTrue)
                        .help("Remove exactly the named packages, skipping orphan removal and safety checks"),
                )
                .arg(yes.clone()),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade installed packages to newer repository versions")
                .arg(
                    Arg::new("names")
                        .num_args(0..)
                        .help("Package names (upgrades all if omitted)"),
                )
                .arg(yes),
        )
        .subcommand(
            Command::new("search")
                .about("Search the repository by name and description")
                .arg(Arg::new("terms").required(true).num_args(1..).help("Search terms")),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("info")
                .about("Show details of a package")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("cache")
                .about("Manage the download and source caches")
                .subcommand(Command::new("clear").about("Delete every cached entry"))
                .subcommand(Command::new("size").about("Show cache disk usage")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("modkeep.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
