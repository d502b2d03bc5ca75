use crate::machine::{HostData, IoBuffer, IoSet};
use crate::sandfs::fs::FileMode;

pub fn lossy(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).into_owned()
}

/// "drwx" / "-rw-" style mode column for ls.
pub fn mode_string(mode: FileMode) -> String {
  let mut result = String::with_capacity(4);
  result.push(if mode.is_directory() { 'd' } else { '-' });
  result.push(if mode.readable() { 'r' } else { '-' });
  result.push(if mode.writable() { 'w' } else { '-' });
  result.push(if mode.executable() { 'x' } else { '-' });
  result
}

/// Build a HostData with one input set and a list of declared output sets.
/// Used by tests and nowhere else worth a builder.
pub fn host_with_input(set_ident: &str, items: &[(&str, &[u8])], outputs: &[&str]) -> HostData {
  HostData {
    input_sets: vec![IoSet {
      ident: set_ident.to_owned(),
      buffers: items
        .iter()
        .enumerate()
        .map(|(index, (ident, data))| IoBuffer {
          ident: (*ident).to_owned(),
          data: data.to_vec(),
          key: index as u32,
        })
        .collect(),
    }],
    output_sets: outputs
      .iter()
      .map(|ident| IoSet {
        ident: (*ident).to_owned(),
        buffers: Vec::new(),
      })
      .collect(),
  }
}

// vim:ts=2 sw=2
