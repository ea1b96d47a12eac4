use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{debug, error};
use vm_common::{ConfigStore, init_logging, level_from_verbosity};
use vm_error::LaunchError;
use vm_osal::HostProbe;

mod commands;
mod prompt;

use commands::Session;
use prompt::StdinPrompt;

fn vm_id_arg() -> Arg {
    Arg::new("id").value_name("ID").help("VM identifier").required(true)
}

fn cli() -> Command {
    Command::new("qemu-launcher")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage and launch QEMU virtual machines from TOML configuration")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config-dir")
                .short('c')
                .long("config-dir")
                .value_name("DIR")
                .help("Configuration directory (default: $QEMU_LAUNCHER_HOME or ./.meta)")
                .global(true),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .help("Answer yes to every question")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (repeatable)")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Less log output (repeatable)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(Command::new("list").about("List configured VMs"))
        .subcommand(
            Command::new("show")
                .about("Print the launch command for a VM without running it")
                .arg(vm_id_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the command as a JSON array")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("launch").about("Compile and run a VM").arg(vm_id_arg()))
        .subcommand(
            Command::new("create-disk")
                .about("Create the primary disk image of a VM")
                .arg(vm_id_arg()),
        )
        .subcommand(
            Command::new("new").about("Add a VM from the default template").arg(
                Arg::new("name")
                    .value_name("NAME")
                    .help("Display name")
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("delete")
                .about("Remove a VM configuration")
                .arg(vm_id_arg())
                .arg(
                    Arg::new("with-disk")
                        .long("with-disk")
                        .help("Also delete the primary disk image")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("settings").about("Print global settings"))
        .subcommand(Command::new("check").about("Check that the QEMU executables can be found"))
}

fn id_of(matches: &ArgMatches) -> &str {
    matches.get_one::<String>("id").map(String::as_str).unwrap_or_default()
}

fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let dir = matches
        .get_one::<String>("config-dir")
        .map(PathBuf::from)
        .unwrap_or_else(ConfigStore::default_dir);
    debug!("Using configuration directory {}", dir.display());

    let mut session = Session {
        store: ConfigStore::open(dir)?,
        host: HostProbe::detect(),
        prompt: StdinPrompt::new(matches.get_flag("yes")),
    };

    match matches.subcommand() {
        Some(("list", _)) => commands::list(&session),
        Some(("show", sub)) => commands::show(&session, id_of(sub), sub.get_flag("json")),
        Some(("launch", sub)) => commands::launch(&session, id_of(sub)),
        Some(("create-disk", sub)) => commands::create_disk(&session, id_of(sub)),
        Some(("new", sub)) => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            commands::new_vm(&mut session, name)
        }
        Some(("delete", sub)) => {
            commands::delete(&mut session, id_of(sub), sub.get_flag("with-disk"))
        }
        Some(("settings", _)) => commands::settings(&session),
        Some(("check", _)) => commands::check(&session),
        _ => anyhow::bail!("unknown command"),
    }
}

fn main() {
    let matches = cli().get_matches();
    init_logging(level_from_verbosity(
        matches.get_count("verbose"),
        matches.get_count("quiet"),
    ));

    match run(&matches) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{e:#}");
            process::exit(exit_code_for(&e));
        }
    }
}

/// 2 when the VM cannot run at all, 1 for any other failure.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LaunchError>() {
        Some(e) if e.is_launch_blocking() => 2,
        _ => 1,
    }
}
