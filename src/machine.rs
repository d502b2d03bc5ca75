use std::collections::BTreeMap;
use std::fs;

use log::info;
use serde::Deserialize;

/// One named item inside a transfer set. `data` is moved into the
/// filesystem on startup and refilled from it on shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IoBuffer {
  pub ident: String,
  pub data: Vec<u8>,
  pub key: u32,
}

/// A transfer set: a named group of buffers that maps to one top-level
/// directory of the guest filesystem.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IoSet {
  pub ident: String,
  pub buffers: Vec<IoBuffer>,
}

/// Everything the host hands the guest for one invocation, and the place
/// the guest's results land afterwards.
#[derive(Debug, Default)]
pub struct HostData {
  pub input_sets: Vec<IoSet>,
  pub output_sets: Vec<IoSet>,
}

#[derive(Debug, Deserialize)]
struct MachineSchema {
  machine: MachineDeclaration,
}

#[derive(Debug, Deserialize)]
struct MachineDeclaration {
  /// set ident -> (item ident -> contents)
  #[serde(default)]
  inputs: BTreeMap<String, BTreeMap<String, String>>,
  /// idents of the sets harvested after the run
  #[serde(default)]
  outputs: Vec<String>,
}

/// A host machine declaration loaded from a YAML schema file.
#[derive(Debug)]
pub struct Machine {
  schema: MachineSchema,
}

impl Machine {
  pub fn new(machine_schema_path: &str) -> Self {
    let machine_schema_reader = std::fs::File::open(machine_schema_path)
      .unwrap_or_else(|error| panic!("machine: can't read schema {}: {}", machine_schema_path, error));

    let schema = serde_yaml::from_reader::<_, MachineSchema>(machine_schema_reader)
      .unwrap_or_else(|error| panic!("machine: can't parse schema {}: {}", machine_schema_path, error));

    info!(
      "machine: schema declares {} input set(s), {} output set(s)",
      schema.machine.inputs.len(),
      schema.machine.outputs.len()
    );
    Self { schema }
  }

  /// Resolve `item: "@some/file"` values against the host filesystem,
  /// everything else is taken literally.
  fn item_bytes(contents: String) -> Vec<u8> {
    match contents.strip_prefix('@') {
      Some(host_path) => fs::read(host_path)
        .unwrap_or_else(|error| panic!("machine: can't read input file {}: {}", host_path, error)),
      None => contents.into_bytes(),
    }
  }

  pub fn into_host_data(self) -> HostData {
    let input_sets = self
      .schema
      .machine
      .inputs
      .into_iter()
      .map(|(set_ident, items)| IoSet {
        ident: set_ident,
        buffers: items
          .into_iter()
          .enumerate()
          .map(|(index, (ident, contents))| IoBuffer {
            ident,
            data: Self::item_bytes(contents),
            key: index as u32,
          })
          .collect(),
      })
      .collect();
    let output_sets = self
      .schema
      .machine
      .outputs
      .into_iter()
      .map(|ident| IoSet { ident, buffers: Vec::new() })
      .collect();
    HostData { input_sets, output_sets }
  }
}


// vim:ts=2 sw=2
