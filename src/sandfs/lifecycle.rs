use log::{debug, warn};

use crate::machine::{HostData, IoBuffer};
use crate::sandfs::fs::{
  FileMode, OpenFlags, FS_NAME_LENGTH, S_IRUSR, S_IRWXU, S_IWUSR, STDERR_FILENO, STDIN_FILENO,
  STDOUT_FILENO,
};
use crate::sandfs::kernel::{Args, Errno, Kernel};
use crate::sandfs::paths::Path;
use crate::sandfs::tree::NodeId;

/// The set whose items get special treatment: its `stdin` is wired to
/// descriptor 0 and its `argv`/`environ` are tokenized for the process.
pub const STDIO_SET: &str = "stdio";

/// What the guest process starts with, recovered from the stdio input set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessInit {
  pub argv: Args,
  pub environ: Args,
}

/// Split a buffer into arguments the way a minimal shell would: spaces
/// separate, single or double quotes group (no escapes), an unterminated
/// quote runs to the end of the buffer. Quotes themselves are stripped.
pub fn split_quoted(data: &[u8]) -> Args {
  let mut result = Vec::new();
  let mut token: Vec<u8> = Vec::new();
  let mut started = false;
  let mut quote: Option<u8> = None;

  for byte in data.iter().copied() {
    match quote {
      Some(delimiter) => {
        if byte == delimiter {
          quote = None;
        } else {
          token.push(byte);
        }
      }
      None => match byte {
        b'\'' | b'"' => {
          quote = Some(byte);
          started = true;
        }
        b' ' => {
          if started {
            result.push(String::from_utf8_lossy(&token).into_owned());
            token.clear();
            started = false;
          }
        }
        other => {
          token.push(other);
          started = true;
        }
      },
    }
  }
  if started {
    result.push(String::from_utf8_lossy(&token).into_owned());
  }
  result
}

impl Kernel {
  /// Create one input item under its set directory. The ident may carry
  /// subdirectories; ascending out of the set's subtree is refused.
  fn place_item(&mut self, set_dir: NodeId, ident: &str, data: Vec<u8>) -> Result<(), Errno> {
    let path = Path::from_str(ident)?;
    let name = path.file_name();
    if name.len() > FS_NAME_LENGTH {
      return Err(Errno::ENAMETOOLONG("startup: item name exceeds FS_NAME_LENGTH"));
    }
    let parent = self.tree.ensure_directories(set_dir, path.directories(), false)?;
    if self.tree.find_child(parent, name.as_bytes()).is_some() {
      return Err(Errno::EEXIST("startup: duplicate item in set"));
    }
    let node = self.tree.create_file(Some(data), FileMode::new(S_IRWXU));
    self.tree.link(parent, node, name.as_bytes())
  }

  /// Build the filesystem for one invocation. Consumes the host's input
  /// buffers (their data moves into the tree without copying) and returns
  /// the kernel plus the argv/environ recovered from the stdio set.
  pub fn startup(host: &mut HostData) -> Result<(Self, ProcessInit), Errno> {
    let mut kernel = Kernel::new();
    let root = kernel.tree.root();
    let mut init = ProcessInit::default();

    // stdout and stderr exist from the start so the guest can always write
    // to descriptors 1 and 2, even when the host declared no stdio set
    let stdio_dir = kernel.tree.ensure_directories(root, Path::from_str(STDIO_SET)?, false)?;
    for (fileno, name) in [(STDERR_FILENO, b"stderr".as_ref()), (STDOUT_FILENO, b"stdout".as_ref())] {
      let node = kernel.tree.create_file(None, FileMode::new(S_IWUSR));
      kernel.tree.link(stdio_dir, node, name)?;
      kernel.open_at_slot(fileno as usize, node, OpenFlags::write(), false)?;
    }

    for set in &mut host.input_sets {
      if set.ident.is_empty() {
        warn!("startup: skipping input set with empty ident");
        continue;
      }
      let set_dir = kernel.tree.ensure_directories(root, Path::from_str(&set.ident)?, false)?;
      let is_stdio = set.ident == STDIO_SET;

      for item in &mut set.buffers {
        if item.ident.is_empty() {
          warn!("startup: skipping item with empty ident in set {}", set.ident);
          continue;
        }
        let ident = item.ident.clone();
        let data = std::mem::take(&mut item.data);

        if is_stdio {
          match ident.as_str() {
            "argv" => init.argv = split_quoted(&data),
            "environ" => init.environ = split_quoted(&data),
            _ => (),
          }
        }

        kernel.place_item(set_dir, &ident, data)?;

        if is_stdio && ident == "stdin" {
          let node = kernel
            .tree
            .find_child(stdio_dir, b"stdin")
            .ok_or(Errno::ENOENT("startup: stdin vanished after placement"))?;
          kernel.open_at_slot(STDIN_FILENO as usize, node, OpenFlags::read(), false)?;
        }
      }
    }

    // output set directories exist up front so the guest can open files in
    // them without caring whether the host primed the set
    for set in &host.output_sets {
      if set.ident.is_empty() {
        continue;
      }
      kernel.tree.ensure_directories(root, Path::from_str(&set.ident)?, false)?;
    }

    // a guest always has a readable descriptor 0, empty if the host gave none
    if kernel.slot_is_free(STDIN_FILENO as usize) {
      let node = kernel.tree.create_file(None, FileMode::new(S_IRUSR));
      kernel.tree.link(stdio_dir, node, b"stdin")?;
      kernel.open_at_slot(STDIN_FILENO as usize, node, OpenFlags::read(), false)?;
    }

    debug!(
      "startup: {} input set(s) placed, argv has {} token(s)",
      host.input_sets.len(),
      init.argv.len()
    );
    Ok((kernel, init))
  }

  fn harvest(&mut self, dir: NodeId, prefix: &str, out: &mut Vec<IoBuffer>) {
    for entry_id in self.tree.children(dir) {
      let name = self.tree.entry(entry_id).name_string();
      let node = self.tree.entry(entry_id).node;
      if self.tree.node(node).is_directory() {
        self.harvest(node, &format!("{}{}/", prefix, name), out);
      } else {
        let data = self.tree.materialize(node);
        out.push(IoBuffer {
          ident: format!("{}{}", prefix, name),
          data,
          key: out.len() as u32,
        });
      }
    }
  }

  /// Tear the filesystem down, moving every file under the declared output
  /// sets back to the host. Items are identified by their '/'-joined path
  /// relative to the set directory; the synthesized stdio items that were
  /// inputs (argv, environ, stdin) are not reported back.
  pub fn shutdown(mut self, host: &mut HostData) {
    for set in &mut host.output_sets {
      let root = self.tree.root();
      let set_dir = match self.tree.find_child(root, set.ident.as_bytes()) {
        Some(dir) if self.tree.node(dir).is_directory() => dir,
        _ => {
          debug!("shutdown: output set {} has no directory, skipping", set.ident);
          continue;
        }
      };
      let is_stdio = set.ident == STDIO_SET;

      let mut buffers = Vec::new();
      for entry_id in self.tree.children(set_dir) {
        let name = self.tree.entry(entry_id).name_string();
        let node = self.tree.entry(entry_id).node;
        if is_stdio && matches!(name.as_str(), "argv" | "environ" | "stdin") {
          continue;
        }
        if self.tree.node(node).is_directory() {
          self.harvest(node, &format!("{}/", name), &mut buffers);
        } else {
          let data = self.tree.materialize(node);
          buffers.push(IoBuffer { ident: name, data, key: buffers.len() as u32 });
        }
      }
      // reassign keys after the recursion so they are dense per set
      for (index, buffer) in buffers.iter_mut().enumerate() {
        buffer.key = index as u32;
      }
      debug!("shutdown: set {} yields {} buffer(s)", set.ident, buffers.len());
      set.buffers = buffers;
    }
  }
}



// vim:ts=2 sw=2
