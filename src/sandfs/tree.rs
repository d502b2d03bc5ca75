use std::cmp::Ordering;

use crate::sandfs::content::Chunk;
use crate::sandfs::fs::{AddressSize, FileMode, FS_NAME_LENGTH, S_IRWXU};
use crate::sandfs::kernel::Errno;
use crate::sandfs::paths::Path;

pub type NodeId = AddressSize;
pub type EntryId = AddressSize;
pub type ChunkId = AddressSize;

/// Bounded name comparison. Missing bytes rank as NUL, so a name that is a
/// strict prefix of another sorts first. Works on both the zero-padded
/// in-entry arrays and raw path components.
pub fn namecmp(left: &[u8], right: &[u8]) -> Ordering {
  for index in 0..FS_NAME_LENGTH {
    let a = if index < left.len() { left[index] } else { 0 };
    let b = if index < right.len() { right[index] } else { 0 };
    match a.cmp(&b) {
      Ordering::Equal => {
        if a == 0 {
          return Ordering::Equal;
        }
      }
      other => return other,
    }
  }
  Ordering::Equal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePayload {
  Directory { first_entry: Option<EntryId> },
  File { content: Option<ChunkId> },
}

/// One name in one directory, referencing a node. Hard links are several
/// entries referencing the same node; `hard_links` on the node counts them.
#[derive(Debug)]
pub struct Entry {
  pub name: [u8; FS_NAME_LENGTH],
  pub node: NodeId,
  pub next: Option<EntryId>,
}

impl Entry {
  fn new(name: &[u8], node: NodeId) -> Result<Self, Errno> {
    if name.len() > FS_NAME_LENGTH {
      return Err(Errno::ENAMETOOLONG("tree: name exceeds FS_NAME_LENGTH"));
    }
    let mut name_buf = [0u8; FS_NAME_LENGTH];
    name_buf[..name.len()].copy_from_slice(name);
    Ok(Self { name: name_buf, node, next: None })
  }

  /// Name bytes up to the first NUL.
  pub fn name_bytes(&self) -> &[u8] {
    let length = self.name.iter().position(|byte| *byte == 0).unwrap_or(FS_NAME_LENGTH);
    &self.name[..length]
  }

  pub fn name_string(&self) -> String {
    String::from_utf8_lossy(self.name_bytes()).into_owned()
  }
}

#[derive(Debug)]
pub struct Node {
  /// Containing directory. Tracked for directories (they have exactly one
  /// containing entry, and ".." needs it); files can be referenced from
  /// several directories and carry no meaningful parent.
  pub parent: Option<NodeId>,
  pub payload: NodePayload,
  /// Number of directory entries referencing this node.
  pub hard_links: u16,
  /// Number of live descriptors referencing this node.
  pub open_descriptors: u16,
  pub mode: FileMode,
}

impl Node {
  pub fn is_directory(&self) -> bool {
    matches!(self.payload, NodePayload::Directory { .. })
  }
  pub fn is_file(&self) -> bool {
    matches!(self.payload, NodePayload::File { .. })
  }

  pub fn first_entry(&self) -> Option<EntryId> {
    match self.payload {
      NodePayload::Directory { first_entry } => first_entry,
      NodePayload::File { .. } => None,
    }
  }
}

/// The whole tree lives in three arenas - nodes, directory entries and
/// content chunks - addressed by stable indices. Nothing is ever moved, only
/// relinked, so ids held by open descriptors stay valid for the referent's
/// whole lifetime.
#[derive(Debug)]
pub struct NodeTree {
  pub(crate) nodes: Vec<Option<Node>>,
  free_nodes: Vec<NodeId>,
  pub(crate) entries: Vec<Option<Entry>>,
  free_entries: Vec<EntryId>,
  pub(crate) chunks: Vec<Option<Chunk>>,
  pub(crate) free_chunks: Vec<ChunkId>,
  root: NodeId,
}

impl NodeTree {
  pub fn new() -> Self {
    let mut tree = Self {
      nodes: Vec::new(),
      free_nodes: Vec::new(),
      entries: Vec::new(),
      free_entries: Vec::new(),
      chunks: Vec::new(),
      free_chunks: Vec::new(),
      root: 0,
    };
    // the root carries one permanent link so it can never be destroyed
    tree.root = tree.insert_node(Node {
      parent: None,
      payload: NodePayload::Directory { first_entry: None },
      hard_links: 1,
      open_descriptors: 0,
      mode: FileMode::directory(S_IRWXU),
    });
    tree
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn node(&self, id: NodeId) -> &Node {
    self.nodes[id as usize]
      .as_ref()
      .expect("tree: node id refers to a freed node")
  }

  pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
    self.nodes[id as usize]
      .as_mut()
      .expect("tree: node id refers to a freed node")
  }

  pub fn entry(&self, id: EntryId) -> &Entry {
    self.entries[id as usize]
      .as_ref()
      .expect("tree: entry id refers to a freed entry")
  }

  pub fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
    self.entries[id as usize]
      .as_mut()
      .expect("tree: entry id refers to a freed entry")
  }

  fn insert_node(&mut self, node: Node) -> NodeId {
    if let Some(id) = self.free_nodes.pop() {
      self.nodes[id as usize] = Some(node);
      id
    } else {
      self.nodes.push(Some(node));
      (self.nodes.len() - 1) as NodeId
    }
  }

  fn release_node(&mut self, id: NodeId) {
    self.nodes[id as usize] = None;
    self.free_nodes.push(id);
  }

  fn insert_entry(&mut self, entry: Entry) -> EntryId {
    if let Some(id) = self.free_entries.pop() {
      self.entries[id as usize] = Some(entry);
      id
    } else {
      self.entries.push(Some(entry));
      (self.entries.len() - 1) as EntryId
    }
  }

  fn release_entry(&mut self, id: EntryId) {
    self.entries[id as usize] = None;
    self.free_entries.push(id);
  }

  /// Look a name up in a directory's sorted entry list. The scan stops as
  /// soon as an entry compares greater.
  pub fn find_entry(&self, dir: NodeId, component: &[u8]) -> Option<EntryId> {
    let mut current = self.node(dir).first_entry();
    while let Some(id) = current {
      let entry = self.entry(id);
      match namecmp(entry.name_bytes(), component) {
        Ordering::Equal => return Some(id),
        Ordering::Greater => return None,
        Ordering::Less => current = entry.next,
      }
    }
    None
  }

  /// Look a single component up in a directory. "." is the directory itself,
  /// ".." its parent (None at the root).
  pub fn find_child(&self, dir: NodeId, component: &[u8]) -> Option<NodeId> {
    if component == b"." {
      return Some(dir);
    }
    if component == b".." {
      return self.node(dir).parent;
    }
    self.find_entry(dir, component).map(|id| self.entry(id).node)
  }

  /// Walk an absolute path from the root, component by component.
  pub fn resolve(&self, mut path: Path) -> Option<NodeId> {
    let mut current = self.root;
    loop {
      let component = path.advance();
      if component.is_empty() {
        return Some(current);
      }
      if !self.node(current).is_directory() {
        return None;
      }
      current = self.find_child(current, component.as_bytes())?;
    }
  }

  /// Allocate an anonymous file node. The optional initial content buffer is
  /// adopted as the single first chunk without copying. Naming happens in
  /// `link`.
  pub fn create_file(&mut self, content: Option<Vec<u8>>, mode: FileMode) -> NodeId {
    let head = content.map(|data| self.adopt_buffer(data));
    self.insert_node(Node {
      parent: None,
      payload: NodePayload::File { content: head },
      hard_links: 0,
      open_descriptors: 0,
      mode: FileMode::new(mode.get_raw() | crate::sandfs::fs::S_IFREG),
    })
  }

  /// Allocate an anonymous directory node. Naming happens in `link`.
  pub fn create_directory(&mut self, mode: FileMode) -> NodeId {
    self.insert_node(Node {
      parent: None,
      payload: NodePayload::Directory { first_entry: None },
      hard_links: 0,
      open_descriptors: 0,
      mode: FileMode::new(mode.get_raw() | crate::sandfs::fs::S_IFDIR),
    })
  }

  fn set_first_entry(&mut self, dir: NodeId, head: Option<EntryId>) {
    match &mut self.node_mut(dir).payload {
      NodePayload::Directory { first_entry } => *first_entry = head,
      NodePayload::File { .. } => unreachable!("tree: set_first_entry on a file"),
    }
  }

  /// Create an entry named `name` for `node` in `dir`'s sorted entry list
  /// and count the new link. This is the only place `hard_links` ever goes
  /// up; other directories' entries for the same node are untouched.
  pub fn link(&mut self, dir: NodeId, node: NodeId, name: &[u8]) -> Result<(), Errno> {
    if !self.node(dir).is_directory() {
      return Err(Errno::ENOTDIR("tree.link: target is not a directory"));
    }
    if self.node(node).hard_links == u16::MAX {
      return Err(Errno::EMLINK("tree.link: hard link count would overflow"));
    }

    let id = self.insert_entry(Entry::new(name, node)?);
    let name = self.entry(id).name;
    match self.node(dir).first_entry() {
      None => {
        self.set_first_entry(dir, Some(id));
      }
      Some(head) => {
        if namecmp(&name, &self.entry(head).name) == Ordering::Less {
          self.entry_mut(id).next = Some(head);
          self.set_first_entry(dir, Some(id));
        } else {
          let mut current = head;
          while let Some(next) = self.entry(current).next {
            if namecmp(&name, &self.entry(next).name) == Ordering::Less {
              break;
            }
            current = next;
          }
          self.entry_mut(id).next = self.entry(current).next;
          self.entry_mut(current).next = Some(id);
        }
      }
    }

    if self.node(node).is_directory() {
      self.node_mut(node).parent = Some(dir);
    }
    self.node_mut(node).hard_links += 1;
    Ok(())
  }

  /// Remove the entry named `name` from `dir`, drop the link and destroy the
  /// node if nothing references it anymore.
  pub fn unlink(&mut self, dir: NodeId, name: &[u8]) -> Result<(), Errno> {
    if !self.node(dir).is_directory() {
      return Err(Errno::ENOTDIR("tree.unlink: not a directory"));
    }
    let target = self
      .find_entry(dir, name)
      .ok_or(Errno::ENOENT("tree.unlink: no entry with that name"))?;

    let target_next = self.entry(target).next;
    if self.node(dir).first_entry() == Some(target) {
      self.set_first_entry(dir, target_next);
    } else {
      let mut current = self
        .node(dir)
        .first_entry()
        .expect("tree.unlink: the entry was found in this list");
      loop {
        match self.entry(current).next {
          Some(next) if next == target => {
            self.entry_mut(current).next = target_next;
            break;
          }
          Some(next) => current = next,
          None => unreachable!("tree.unlink: the entry was found in this list"),
        }
      }
    }

    let node = self.entry(target).node;
    self.release_entry(target);
    self.node_mut(node).hard_links -= 1;
    self.maybe_destroy(node);
    Ok(())
  }

  /// Walk `path` from `start`, creating any missing directories. "." is
  /// skipped; ".." ascends when `allow_ascend` is set and fails otherwise -
  /// that is what keeps input/output items from escaping their set's subtree.
  /// At the root, ascending is a no-op.
  pub fn ensure_directories(&mut self, start: NodeId, mut path: Path, allow_ascend: bool) -> Result<NodeId, Errno> {
    if !self.node(start).is_directory() {
      return Err(Errno::ENOTDIR("tree.ensure_directories: start is not a directory"));
    }
    let mut directory = start;
    loop {
      let component = path.advance();
      if component.is_empty() {
        break;
      }
      let component = component.as_bytes();
      if component.len() > FS_NAME_LENGTH {
        return Err(Errno::ENAMETOOLONG("tree.ensure_directories: component exceeds FS_NAME_LENGTH"));
      }
      if component == b"." {
        continue;
      }
      if component == b".." {
        if !allow_ascend {
          return Err(Errno::EPERM("tree.ensure_directories: ascending out of the subtree is not allowed"));
        }
        if let Some(parent) = self.node(directory).parent {
          directory = parent;
        }
        continue;
      }
      if let Some(existing) = self.find_child(directory, component) {
        if !self.node(existing).is_directory() {
          return Err(Errno::ENOTDIR("tree.ensure_directories: path component is a file"));
        }
        directory = existing;
        continue;
      }
      let new_dir = self.create_directory(FileMode::directory(S_IRWXU));
      self.link(directory, new_dir, component)?;
      directory = new_dir;
    }
    Ok(directory)
  }

  /// Destroy `node` if neither links nor descriptors reference it. A
  /// destroyed directory drops its entries and destroys the children they
  /// referenced; a destroyed file frees its chunk chain.
  pub fn maybe_destroy(&mut self, node: NodeId) {
    {
      let node_ref = self.node(node);
      if node_ref.hard_links != 0 || node_ref.open_descriptors != 0 {
        return;
      }
    }
    match self.node(node).payload {
      NodePayload::Directory { first_entry } => {
        let mut current = first_entry;
        while let Some(id) = current {
          current = self.entry(id).next;
          let child = self.entry(id).node;
          self.release_entry(id);
          self.node_mut(child).hard_links -= 1;
          self.maybe_destroy(child);
        }
      }
      NodePayload::File { content } => {
        self.free_chunk_chain(content);
      }
    }
    self.release_node(node);
  }

  pub fn is_empty_directory(&self, dir: NodeId) -> bool {
    self.node(dir).is_directory() && self.node(dir).first_entry().is_none()
  }

  /// Entry ids of a directory in list (name) order.
  pub fn children(&self, dir: NodeId) -> Vec<EntryId> {
    let mut result = Vec::new();
    let mut current = self.node(dir).first_entry();
    while let Some(id) = current {
      result.push(id);
      current = self.entry(id).next;
    }
    result
  }
}

impl Default for NodeTree {
  fn default() -> Self {
    Self::new()
  }
}


// vim:ts=2 sw=2
