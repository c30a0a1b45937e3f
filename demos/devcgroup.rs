use std::path::Path;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use libdevcgroup::DeviceCgroup;
use oci_spec::runtime::LinuxDeviceCgroup;

fn cli() -> Command {
    clap::Command::new("devcgroup")
        .version("0.1")
        .about("inspect and change the device whitelist of a cgroup v1 devices cgroup")
        .arg(
            Arg::new("cgroup_dir")
                .short('c')
                .value_name("CGROUP_DIR")
                .required(true)
                .help("Path of the devices cgroup, relative paths are resolved against the devices hierarchy"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("list").about("print the effective device whitelist"))
        .subcommand(
            Command::new("allow")
                .about("append rules to devices.allow")
                .arg(Arg::new("rules").value_name("RULE").action(ArgAction::Append)),
        )
        .subcommand(
            Command::new("deny")
                .about("append rules to devices.deny")
                .arg(Arg::new("rules").value_name("RULE").action(ArgAction::Append)),
        )
        .subcommand(Command::new("children").about("print nested cgroups"))
        .subcommand(
            Command::new("apply")
                .about("apply OCI device rules")
                .arg(
                    Arg::new("input_file")
                        .value_name("INPUT_FILE")
                        .required(true)
                        .help("File contains Vec<LinuxDeviceCgroup> in json format"),
                ),
        )
}

fn parse_device_rules<P: AsRef<Path>>(path: P) -> Result<Vec<LinuxDeviceCgroup>> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let rules = serde_json::from_str(&content)?;
    Ok(rules)
}

fn rules(matches: &clap::ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("rules")
        .map(|rules| rules.cloned().collect())
        .unwrap_or_default()
}

fn load(cgroup_dir: &str) -> Result<DeviceCgroup> {
    let cgroup = if Path::new(cgroup_dir).is_absolute() {
        DeviceCgroup::load(cgroup_dir)?
    } else {
        DeviceCgroup::load_relative(cgroup_dir)?
    };
    Ok(cgroup)
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = cli().get_matches();
    let cgroup_dir = matches
        .get_one::<String>("cgroup_dir")
        .context("missing cgroup dir")?;
    let cgroup = load(cgroup_dir)?;

    match matches.subcommand() {
        Some(("list", _)) => {
            for rule in cgroup.list()? {
                println!("{rule}");
            }
        }
        Some(("allow", submatch)) => {
            cgroup.allow(rules(submatch))?;
            println!("allow ok");
        }
        Some(("deny", submatch)) => {
            cgroup.deny(rules(submatch))?;
            println!("deny ok");
        }
        Some(("children", _)) => {
            for child in cgroup.children()? {
                println!("{}", child.display());
            }
        }
        Some(("apply", submatch)) => {
            let input_file = submatch
                .get_one::<String>("input_file")
                .context("missing input file")?;
            let rules = parse_device_rules(input_file)?;
            cgroup.apply(&rules)?;
            println!("apply ok");
        }
        _ => unreachable!(),
    };

    Ok(())
}
