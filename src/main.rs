mod binaries;
mod machine;
mod sandfs;
mod util;

use clap::Parser;
use itertools::Itertools;
use log::info;

use crate::machine::Machine;
use crate::sandfs::kernel::{Args, Kernel};
use crate::util::lossy;

/// Host-side harness: builds the guest filesystem from a machine schema,
/// drops into a shell operating on it, and dumps the output sets on exit.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
  /// Path to the machine schema
  #[clap(default_value = "hosts/demo.yaml")]
  schema: String,
}

pub fn main() {
  env_logger::init();
  let cli = Cli::parse();

  let machine = Machine::new(&cli.schema);
  let mut host = machine.into_host_data();

  let (mut kernel, init) = match Kernel::startup(&mut host) {
    Ok(startup) => startup,
    Err(errno) => {
      eprintln!("startup failed: {errno:?}");
      std::process::exit(1);
    }
  };
  info!("argv: {:?}, environ: {:?}", init.argv, init.environ);

  use std::io::*;

  let mut command = String::new();
  loop {
    command.clear();
    print!("# ");
    stdout().flush().expect("stdout is writable");
    if stdin().read_line(&mut command).expect("stdin is readable") == 0 {
      break;
    }
    let args: Args = command
      .trim()
      .split(' ')
      .filter(|word| !word.is_empty())
      .map(str::to_owned)
      .collect();
    let Some(name) = args.first().cloned() else { continue };

    let exit_code = match name.as_str() {
      "ls" => binaries::ls(args, &mut kernel),
      "cat" => binaries::cat(args, &mut kernel),
      "stat" => binaries::stat(args, &mut kernel),
      "write" => binaries::write(args, &mut kernel),
      "mkdir" => binaries::mkdir(args, &mut kernel),
      "ln" => binaries::ln(args, &mut kernel),
      "rm" => binaries::rm(args, &mut kernel),
      "rmdir" => binaries::rmdir(args, &mut kernel),
      "echo" => {
        println!("{}", args.iter().skip(1).join(" "));
        binaries::EXIT_SUCCESS
      }
      "exit" => break,
      _ => {
        println!("{name}: command not found");
        binaries::EXIT_ENOENT
      }
    };
    if exit_code != binaries::EXIT_SUCCESS {
      info!("{name} exited with {exit_code}");
    }
  }

  kernel.shutdown(&mut host);
  for set in &host.output_sets {
    println!("== output set {} ==", set.ident);
    for buffer in &set.buffers {
      println!("-- {} ({} bytes)", buffer.ident, buffer.data.len());
      println!("{}", lossy(&buffer.data));
    }
  }
}

// vim:ts=2 sw=2
