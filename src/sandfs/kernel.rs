use log::{debug, trace};

use crate::sandfs::content::Cursor;
use crate::sandfs::fs::{
  AddressSize, FileDescriptor, FileMode, FileStat, FileType, OpenFlags, OpenMode, SeekWhence,
  FS_CHUNK_SIZE, FS_MAX_FILES, FS_NAME_LENGTH, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO,
};
use crate::sandfs::paths::Path;
use crate::sandfs::tree::{ChunkId, NodeId, NodeTree};

pub type Args = Vec<String>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Errno {
  /// Operation not permitted
  EPERM(&'static str),
  /// No such entity
  ENOENT(&'static str),
  /// Bad file descriptor
  EBADF(&'static str),
  /// Out of memory
  ENOMEM(&'static str),
  /// Permission denied
  EACCES(&'static str),
  /// File exists
  EEXIST(&'static str),
  /// Not a directory
  ENOTDIR(&'static str),
  /// Is a directory
  EISDIR(&'static str),
  /// Invalid argument
  EINVAL(&'static str),
  /// Too many open files
  EMFILE(&'static str),
  /// Too many links
  EMLINK(&'static str),
  /// Name too long
  ENAMETOOLONG(&'static str),
  /// Directory not empty
  ENOTEMPTY(&'static str),
}

impl Errno {
  /// Conventional POSIX numbering; the libc shim negates this into errno.
  pub fn code(&self) -> i32 {
    match self {
      Errno::EPERM(_) => 1,
      Errno::ENOENT(_) => 2,
      Errno::EBADF(_) => 9,
      Errno::ENOMEM(_) => 12,
      Errno::EACCES(_) => 13,
      Errno::EEXIST(_) => 17,
      Errno::ENOTDIR(_) => 20,
      Errno::EISDIR(_) => 21,
      Errno::EINVAL(_) => 22,
      Errno::EMFILE(_) => 24,
      Errno::EMLINK(_) => 31,
      Errno::ENAMETOOLONG(_) => 36,
      Errno::ENOTEMPTY(_) => 39,
    }
  }
}

#[derive(Debug, Clone)]
pub struct FileDescription {
  pub node: NodeId,
  pub flags: OpenFlags,
  pub cursor: Cursor,
}

/// A directory stream: the node plus a child index for readdir/seekdir.
#[derive(Debug, Clone)]
pub struct DirDescription {
  pub node: NodeId,
  pub child: usize,
}

#[derive(Debug, Clone)]
pub enum Description {
  File(FileDescription),
  Directory(DirDescription),
}

impl Description {
  fn node(&self) -> NodeId {
    match self {
      Description::File(desc) => desc.node,
      Description::Directory(desc) => desc.node,
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DirEntry {
  pub name: String,
  pub file_type: FileType,
  pub offset: usize,
}

/// The whole filesystem state for one invocation: the tree plus the
/// fixed-size open-file table (slot index == descriptor number).
#[derive(Debug)]
pub struct Kernel {
  pub tree: NodeTree,
  open_files: Vec<Option<Description>>,
}

impl Kernel {
  pub fn new() -> Self {
    Self {
      tree: NodeTree::new(),
      open_files: (0..FS_MAX_FILES).map(|_| None).collect(),
    }
  }

  fn lowest_free_slot(&self) -> Result<usize, Errno> {
    self
      .open_files
      .iter()
      .position(|slot| slot.is_none())
      .ok_or(Errno::EMFILE("kernel: no free descriptor slot"))
  }

  pub(crate) fn slot_is_free(&self, index: usize) -> bool {
    self.open_files[index].is_none()
  }

  fn file_description(&self, fd: FileDescriptor) -> Result<&FileDescription, Errno> {
    match self.open_files.get(fd as usize) {
      Some(Some(Description::File(desc))) => Ok(desc),
      _ => Err(Errno::EBADF("kernel: descriptor is not an open file")),
    }
  }

  fn file_description_mut(&mut self, fd: FileDescriptor) -> Result<&mut FileDescription, Errno> {
    match self.open_files.get_mut(fd as usize) {
      Some(Some(Description::File(desc))) => Ok(desc),
      _ => Err(Errno::EBADF("kernel: descriptor is not an open file")),
    }
  }

  fn dir_description_mut(&mut self, fd: FileDescriptor) -> Result<&mut DirDescription, Errno> {
    match self.open_files.get_mut(fd as usize) {
      Some(Some(Description::Directory(desc))) => Ok(desc),
      _ => Err(Errno::EBADF("kernel: descriptor is not an open directory")),
    }
  }

  /// Reset any other descriptor whose cursor points into a freed chunk.
  /// A rebound cursor parks at start-of-file; the chunk/offset model cannot
  /// represent a position past the new end.
  fn repair_cursors(&mut self, node: NodeId, freed: &[ChunkId]) {
    if freed.is_empty() {
      return;
    }
    for slot in self.open_files.iter_mut().flatten() {
      if let Description::File(desc) = slot {
        if desc.node == node && desc.cursor.chunk.map_or(false, |id| freed.contains(&id)) {
          desc.cursor = Cursor::detached();
        }
      }
    }
  }

  /// Bind `node` to a specific table slot. Permission checks are skipped on
  /// the creation path: POSIX grants the new descriptor's access mode
  /// regardless of the mode the file was just created with.
  pub(crate) fn open_at_slot(
    &mut self,
    index: usize,
    node: NodeId,
    flags: OpenFlags,
    enforce_permissions: bool,
  ) -> Result<(), Errno> {
    if enforce_permissions {
      let mode = self.tree.node(node).mode;
      if flags.mode.readable() && !mode.readable() {
        return Err(Errno::EACCES("open: file is not readable"));
      }
      if flags.mode.writable() && !mode.writable() {
        return Err(Errno::EACCES("open: file is not writable"));
      }
    }

    // O_TRUNC drops existing content when the access mode permits writing
    // (or when checks are skipped on the creation path)
    if flags.truncate
      && self.tree.node(node).is_file()
      && ((flags.mode.writable() && self.tree.node(node).mode.writable()) || !enforce_permissions)
    {
      let head = self.tree.content_head(node);
      let freed = self.tree.free_chunk_chain(head);
      self.tree.set_content_head(node, None);
      self.repair_cursors(node, &freed);
    }

    // opening never touches hard_links - an open file is kept alive by
    // open_descriptors alone
    self.tree.node_mut(node).open_descriptors += 1;
    let cursor = Cursor::start(self.tree.content_head(node));
    self.open_files[index] = Some(Description::File(FileDescription { node, flags, cursor }));
    Ok(())
  }

  pub fn open(&mut self, pathname: &str, flags: OpenFlags, mode: FileMode) -> Result<FileDescriptor, Errno> {
    let path = Path::from_str(pathname)?;
    let existing = self.tree.resolve(path);

    if flags.exclusive && flags.create && existing.is_some() {
      return Err(Errno::EEXIST("open: O_EXCL and the file exists"));
    }

    let (node, created) = match existing {
      Some(node) => (node, false),
      None => {
        if !flags.create {
          return Err(Errno::ENOENT("open: no such file and O_CREAT not set"));
        }
        let file_name = path.file_name();
        if file_name.len() > FS_NAME_LENGTH {
          return Err(Errno::ENAMETOOLONG("open: file name too long"));
        }
        let parent = self
          .tree
          .ensure_directories(self.tree.root(), path.directories(), true)
          .map_err(|_| Errno::ENOTDIR("open: cannot create parent directories"))?;
        let node = self.tree.create_file(None, mode);
        self.tree.link(parent, node, file_name.as_bytes())?;
        (node, true)
      }
    };

    let index = self.lowest_free_slot()?;
    self.open_at_slot(index, node, flags, !created)?;
    trace!("open {:?} -> fd {}", pathname, index);
    Ok(index as FileDescriptor)
  }

  pub fn close(&mut self, fd: FileDescriptor) -> Result<(), Errno> {
    let description = self
      .open_files
      .get_mut(fd as usize)
      .and_then(Option::take)
      .ok_or(Errno::EBADF("close: descriptor not open"))?;
    let node = description.node();
    self.tree.node_mut(node).open_descriptors -= 1;
    self.tree.maybe_destroy(node);
    Ok(())
  }

  pub fn read(&mut self, fd: FileDescriptor, buf: &mut [u8]) -> Result<usize, Errno> {
    let desc = self.file_description(fd)?;
    if !desc.flags.mode.readable() {
      return Err(Errno::EBADF("read: descriptor is write-only"));
    }
    let node = desc.node;
    if !self.tree.node(node).is_file() {
      return Err(Errno::EINVAL("read: not a regular file"));
    }
    let mut cursor = desc.cursor;
    let read_bytes = self.tree.read_stream(node, &mut cursor, buf);
    self.file_description_mut(fd)?.cursor = cursor;
    Ok(read_bytes)
  }

  pub fn pread(&mut self, fd: FileDescriptor, buf: &mut [u8], offset: i64) -> Result<usize, Errno> {
    let desc = self.file_description(fd)?;
    if !desc.flags.mode.readable() {
      return Err(Errno::EBADF("pread: descriptor is write-only"));
    }
    let node = desc.node;
    if !self.tree.node(node).is_file() {
      return Err(Errno::EINVAL("pread: not a regular file"));
    }
    if offset < 0 {
      return Err(Errno::EINVAL("pread: negative offset"));
    }
    Ok(self.tree.read_at_offset(node, offset as usize, buf))
  }

  pub fn write(&mut self, fd: FileDescriptor, buf: &[u8]) -> Result<usize, Errno> {
    let desc = self.file_description(fd)?;
    if !desc.flags.mode.writable() {
      return Err(Errno::EBADF("write: descriptor is read-only"));
    }
    let node = desc.node;
    let append = desc.flags.append;
    if !self.tree.node(node).is_file() {
      return Err(Errno::EINVAL("write: not a regular file"));
    }
    let mut cursor = desc.cursor;
    // an O_APPEND write always lands at the current end of content
    if append {
      cursor = self.end_cursor(node);
    }
    let written = self.tree.write_stream(node, &mut cursor, buf);
    self.file_description_mut(fd)?.cursor = cursor;
    Ok(written)
  }

  pub fn pwrite(&mut self, fd: FileDescriptor, buf: &[u8], offset: i64) -> Result<usize, Errno> {
    let desc = self.file_description(fd)?;
    if !desc.flags.mode.writable() {
      return Err(Errno::EBADF("pwrite: descriptor is read-only"));
    }
    let node = desc.node;
    if !self.tree.node(node).is_file() {
      return Err(Errno::EINVAL("pwrite: not a regular file"));
    }
    if offset < 0 {
      return Err(Errno::EINVAL("pwrite: negative offset"));
    }
    Ok(self.tree.write_at_offset(node, offset as usize, buf))
  }

  fn end_cursor(&self, node: NodeId) -> Cursor {
    let mut current = match self.tree.content_head(node) {
      Some(head) => head,
      None => return Cursor::detached(),
    };
    while let Some(next) = self.tree.chunk(current).next {
      current = next;
    }
    Cursor {
      chunk: Some(current),
      offset: self.tree.chunk(current).used,
    }
  }

  /// Three phases: resolve the whence base, then either recompute from the
  /// file start (negative movement) or advance through existing chunks and
  /// append one zero-filled gap chunk for whatever remains (positive).
  pub fn lseek(&mut self, fd: FileDescriptor, offset: i64, whence: SeekWhence) -> Result<i64, Errno> {
    let desc = self.file_description(fd)?.clone();
    let node = desc.node;
    if !self.tree.node(node).is_file() {
      return Err(Errno::EBADF("lseek: not a regular file"));
    }
    let head = self.tree.content_head(node);

    // phase one: where does the seek start from
    let mut current: Option<ChunkId>;
    let mut chunk_offset: usize = 0;
    let mut total_offset: usize = 0;
    match whence {
      SeekWhence::Set => {
        current = head;
      }
      SeekWhence::Cur => {
        current = desc.cursor.chunk.or(head);
        if let Some(target) = desc.cursor.chunk {
          let mut walk = head;
          while let Some(id) = walk {
            if id == target {
              chunk_offset = desc.cursor.offset;
              total_offset += chunk_offset;
              break;
            }
            total_offset += self.tree.chunk(id).used;
            walk = self.tree.chunk(id).next;
          }
        }
      }
      SeekWhence::End => {
        current = head;
        if let Some(mut id) = head {
          loop {
            total_offset += self.tree.chunk(id).used;
            match self.tree.chunk(id).next {
              Some(next) => id = next,
              None => break,
            }
          }
          current = Some(id);
          chunk_offset = self.tree.chunk(id).used;
        }
      }
    }

    // negative movement never allocates: recompute from the file start
    if offset < 0 {
      if current.is_none() || (total_offset as i64) + offset < 0 {
        return Err(Errno::EINVAL("lseek: offset before start of file"));
      }
      let target = (total_offset as i64 + offset) as usize;
      let mut id = head.expect("lseek: backwards seek implies content exists");
      let mut needed = target;
      loop {
        let used = self.tree.chunk(id).used;
        if used < needed {
          needed -= used;
          id = self
            .tree
            .chunk(id)
            .next
            .expect("lseek: target is within the file so the chain continues");
        } else {
          break;
        }
      }
      self.file_description_mut(fd)?.cursor = Cursor { chunk: Some(id), offset: needed };
      return Ok(target as i64);
    }

    // positive movement: advance through what exists
    let mut remaining = offset as usize;
    if let Some(mut id) = current {
      let mut to_advance = self.tree.chunk(id).used - chunk_offset;
      while to_advance < remaining {
        match self.tree.chunk(id).next {
          Some(next) => {
            remaining -= to_advance;
            total_offset += to_advance;
            id = next;
            chunk_offset = 0;
            to_advance = self.tree.chunk(id).used;
          }
          None => break,
        }
      }
      let step = to_advance.min(remaining);
      chunk_offset += step;
      total_offset += step;
      remaining -= step;
      current = Some(id);
    }

    if remaining == 0 {
      self.file_description_mut(fd)?.cursor = Cursor { chunk: current, offset: chunk_offset };
      return Ok(total_offset as i64);
    }

    // park the cursor in a zero-filled gap chunk covering the rest
    let gap = self.tree.allocate_chunk(remaining);
    self.tree.chunk_mut(gap).used = remaining;
    match current {
      Some(id) => self.tree.chunk_mut(id).next = Some(gap),
      None => self.tree.set_content_head(node, Some(gap)),
    }
    self.file_description_mut(fd)?.cursor = Cursor { chunk: Some(gap), offset: remaining };
    Ok((total_offset + remaining) as i64)
  }

  fn stat_node(&self, node: NodeId) -> FileStat {
    let node_ref = self.tree.node(node);
    FileStat {
      mode: node_ref.mode,
      links_count: node_ref.hard_links as AddressSize,
      size: self.tree.file_size(node) as AddressSize,
      block_size: FS_CHUNK_SIZE as AddressSize,
    }
  }

  pub fn stat(&self, pathname: &str) -> Result<FileStat, Errno> {
    let node = self
      .tree
      .resolve(Path::from_str(pathname)?)
      .ok_or(Errno::ENOTDIR("stat: no such file or directory"))?;
    Ok(self.stat_node(node))
  }

  pub fn fstat(&self, fd: FileDescriptor) -> Result<FileStat, Errno> {
    let description = self
      .open_files
      .get(fd as usize)
      .and_then(Option::as_ref)
      .ok_or(Errno::EBADF("fstat: descriptor not open"))?;
    Ok(self.stat_node(description.node()))
  }

  fn truncate_node(&mut self, node: NodeId, length: i64) -> Result<(), Errno> {
    if length < 0 {
      return Err(Errno::EINVAL("truncate: negative length"));
    }
    if !self.tree.node(node).is_file() {
      return Err(Errno::EISDIR("truncate: not a regular file"));
    }
    let freed = self.tree.truncate_content(node, length as usize);
    self.repair_cursors(node, &freed);
    Ok(())
  }

  pub fn truncate(&mut self, pathname: &str, length: i64) -> Result<(), Errno> {
    let node = self
      .tree
      .resolve(Path::from_str(pathname)?)
      .ok_or(Errno::ENOENT("truncate: no such file or directory"))?;
    self.truncate_node(node, length)
  }

  pub fn ftruncate(&mut self, fd: FileDescriptor, length: i64) -> Result<(), Errno> {
    let desc = self.file_description(fd)?;
    if !desc.flags.mode.writable() {
      return Err(Errno::EBADF("ftruncate: descriptor is read-only"));
    }
    let node = desc.node;
    self.truncate_node(node, length)
  }

  /// Hard-link an existing file under a new name; both entries reference
  /// the same node afterwards.
  pub fn link(&mut self, old: &str, new: &str) -> Result<(), Errno> {
    let node = self
      .tree
      .resolve(Path::from_str(old)?)
      .ok_or(Errno::ENOTDIR("link: no such source file"))?;
    if self.tree.node(node).is_directory() {
      return Err(Errno::EPERM("link: source is a directory"));
    }
    let new_path = Path::from_str(new)?;
    if self.tree.resolve(new_path).is_some() {
      return Err(Errno::EEXIST("link: target already exists"));
    }
    let new_dir = self
      .tree
      .ensure_directories(self.tree.root(), new_path.directories(), true)
      .map_err(|_| Errno::ENOTDIR("link: cannot create target directories"))?;
    self.tree.link(new_dir, node, new_path.file_name().as_bytes())
  }

  pub fn unlink(&mut self, pathname: &str) -> Result<(), Errno> {
    let path = Path::from_str(pathname)?;
    let name = path.file_name();
    if name.is_empty() {
      return Err(Errno::EPERM("unlink: cannot unlink the root"));
    }
    let dir = self
      .tree
      .resolve(path.directories())
      .ok_or(Errno::ENOTDIR("unlink: no such file or directory"))?;
    self
      .tree
      .unlink(dir, name.as_bytes())
      .map_err(|_| Errno::ENOTDIR("unlink: no such file or directory"))
  }

  pub fn mkdir(&mut self, pathname: &str, mode: FileMode) -> Result<(), Errno> {
    let path = Path::from_str(pathname)?;
    let parent = self
      .tree
      .resolve(path.directories())
      .ok_or(Errno::ENOENT("mkdir: parent does not exist"))?;
    if !self.tree.node(parent).is_directory() {
      return Err(Errno::ENOTDIR("mkdir: parent is not a directory"));
    }
    let name = path.file_name();
    if self.tree.find_child(parent, name.as_bytes()).is_some() {
      return Err(Errno::EEXIST("mkdir: name already exists"));
    }
    let new_dir = self.tree.create_directory(mode);
    self.tree.link(parent, new_dir, name.as_bytes())
  }

  pub fn rmdir(&mut self, pathname: &str) -> Result<(), Errno> {
    let path = Path::from_str(pathname)?;
    let node = self
      .tree
      .resolve(path)
      .ok_or(Errno::ENOENT("rmdir: no such directory"))?;
    if !self.tree.node(node).is_directory() {
      return Err(Errno::ENOTDIR("rmdir: not a directory"));
    }
    if !self.tree.is_empty_directory(node) {
      return Err(Errno::ENOTEMPTY("rmdir: directory not empty"));
    }
    if node == self.tree.root() {
      return Err(Errno::EPERM("rmdir: cannot remove the root"));
    }
    let dir = self
      .tree
      .resolve(path.directories())
      .ok_or(Errno::ENOENT("rmdir: no such directory"))?;
    self.tree.unlink(dir, path.file_name().as_bytes())
  }

  pub fn opendir(&mut self, pathname: &str) -> Result<FileDescriptor, Errno> {
    let node = self
      .tree
      .resolve(Path::from_str(pathname)?)
      .ok_or(Errno::ENOENT("opendir: no such directory"))?;
    if !self.tree.node(node).is_directory() {
      return Err(Errno::ENOTDIR("opendir: not a directory"));
    }
    let index = self.lowest_free_slot()?;
    self.tree.node_mut(node).open_descriptors += 1;
    self.open_files[index] = Some(Description::Directory(DirDescription { node, child: 0 }));
    Ok(index as FileDescriptor)
  }

  /// Next entry of the stream, None at the end. Seeking the stream past the
  /// end makes the next read fail with ENOENT, matching the index walk of
  /// the original dirent implementation.
  pub fn readdir(&mut self, fd: FileDescriptor) -> Result<Option<DirEntry>, Errno> {
    let desc = self.dir_description_mut(fd)?;
    let (node, target) = (desc.node, desc.child);

    let mut current = self.tree.node(node).first_entry();
    let mut index = 0;
    while let Some(id) = current {
      if index == target {
        break;
      }
      current = self.tree.entry(id).next;
      index += 1;
    }
    let id = match current {
      Some(id) => id,
      None => {
        if index != target {
          return Err(Errno::ENOENT("readdir: stream seeked past the end"));
        }
        return Ok(None);
      }
    };

    self.dir_description_mut(fd)?.child += 1;
    let entry = self.tree.entry(id);
    let file_type = self.tree.node(entry.node).mode.r#type();
    Ok(Some(DirEntry {
      name: entry.name_string(),
      file_type,
      offset: index,
    }))
  }

  pub fn telldir(&mut self, fd: FileDescriptor) -> Result<usize, Errno> {
    Ok(self.dir_description_mut(fd)?.child)
  }

  pub fn seekdir(&mut self, fd: FileDescriptor, location: usize) -> Result<(), Errno> {
    self.dir_description_mut(fd)?.child = location;
    Ok(())
  }

  pub fn closedir(&mut self, fd: FileDescriptor) -> Result<(), Errno> {
    self.dir_description_mut(fd)?;
    self.close(fd)
  }

  /// The stdio descriptors pretend to be terminals for the shim's benefit.
  pub fn isatty(&self, fd: FileDescriptor) -> bool {
    matches!(fd, STDIN_FILENO | STDOUT_FILENO | STDERR_FILENO)
  }
}

impl Default for Kernel {
  fn default() -> Self {
    let kernel = Self::new();
    debug!("kernel: fresh filesystem, {} descriptor slots", FS_MAX_FILES);
    kernel
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandfs::fs::{S_IRUSR, S_IRWXU, S_IWUSR};

  fn kernel_with_file(pathname: &str, content: &[u8]) -> Kernel {
    let mut kernel = Kernel::new();
    let fd = kernel
      .open(pathname, OpenFlags::create(OpenMode::Write), FileMode::new(S_IRWXU))
      .unwrap();
    kernel.write(fd, content).unwrap();
    kernel.close(fd).unwrap();
    kernel
  }

  #[test]
  fn open_missing_without_creat_fails() {
    let mut kernel = Kernel::new();
    match kernel.open("/nope", OpenFlags::read(), FileMode::default()) {
      Err(Errno::ENOENT(_)) => (),
      other => panic!("expected ENOENT, got {:?}", other),
    }
  }

  #[test]
  fn excl_on_existing_fails() {
    let mut kernel = kernel_with_file("/f", b"x");
    let mut flags = OpenFlags::create(OpenMode::Write);
    flags.exclusive = true;
    match kernel.open("/f", flags, FileMode::default()) {
      Err(Errno::EEXIST(_)) => (),
      other => panic!("expected EEXIST, got {:?}", other),
    }
  }

  #[test]
  fn write_then_read_roundtrip() {
    let mut kernel = kernel_with_file("/data", b"hello world");
    let fd = kernel.open("/data", OpenFlags::read(), FileMode::default()).unwrap();
    let mut buf = [0u8; 32];
    let read = kernel.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..read], b"hello world");
  }

  #[test]
  fn creation_grants_access_despite_mode() {
    // a freshly created read-only file is still writable through the
    // descriptor returned by the creating open
    let mut kernel = Kernel::new();
    let fd = kernel
      .open("/readonly", OpenFlags::create(OpenMode::ReadWrite), FileMode::new(S_IRUSR))
      .unwrap();
    assert_eq!(kernel.write(fd, b"data").unwrap(), 4);
    kernel.close(fd).unwrap();

    // but a later open for writing is refused
    match kernel.open("/readonly", OpenFlags::write(), FileMode::default()) {
      Err(Errno::EACCES(_)) => (),
      other => panic!("expected EACCES, got {:?}", other),
    }
  }

  #[test]
  fn truncate_flag_discards_content() {
    let mut kernel = kernel_with_file("/t", b"old content");
    let mut flags = OpenFlags::write();
    flags.truncate = true;
    let fd = kernel.open("/t", flags, FileMode::default()).unwrap();
    kernel.close(fd).unwrap();
    assert_eq!(kernel.stat("/t").unwrap().size, 0);
  }

  #[test]
  fn truncating_open_repairs_other_cursors() {
    let mut kernel = kernel_with_file("/t", b"old content");
    let reader = kernel.open("/t", OpenFlags::read(), FileMode::default()).unwrap();
    let mut buf = [0u8; 3];
    kernel.read(reader, &mut buf).unwrap();

    let mut flags = OpenFlags::write();
    flags.truncate = true;
    let writer = kernel.open("/t", flags, FileMode::default()).unwrap();
    kernel.write(writer, b"new").unwrap();

    // the reader's cursor pointed into the freed chain; it rebinds to the
    // fresh content instead of reading freed bytes
    let mut all = [0u8; 8];
    let read = kernel.read(reader, &mut all).unwrap();
    assert_eq!(&all[..read], b"new");
  }

  #[test]
  fn read_only_descriptor_cannot_write() {
    let mut kernel = kernel_with_file("/r", b"abc");
    let fd = kernel.open("/r", OpenFlags::read(), FileMode::default()).unwrap();
    match kernel.write(fd, b"nope") {
      Err(Errno::EBADF(_)) => (),
      other => panic!("expected EBADF, got {:?}", other),
    }
  }

  #[test]
  fn append_writes_land_at_the_end() {
    let mut kernel = kernel_with_file("/log", b"one");
    let mut flags = OpenFlags::write();
    flags.append = true;
    let fd = kernel.open("/log", flags, FileMode::default()).unwrap();
    // seek somewhere else first; O_APPEND must still write at the end
    kernel.lseek(fd, 0, SeekWhence::Set).unwrap();
    kernel.write(fd, b"two").unwrap();
    kernel.close(fd).unwrap();

    let fd = kernel.open("/log", OpenFlags::read(), FileMode::default()).unwrap();
    let mut buf = [0u8; 16];
    let read = kernel.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..read], b"onetwo");
  }

  #[test]
  fn lseek_set_cur_end_agree() {
    let mut kernel = kernel_with_file("/s", b"0123456789");
    let fd = kernel.open("/s", OpenFlags::read(), FileMode::default()).unwrap();

    assert_eq!(kernel.lseek(fd, 4, SeekWhence::Set).unwrap(), 4);
    assert_eq!(kernel.lseek(fd, 2, SeekWhence::Cur).unwrap(), 6);
    assert_eq!(kernel.lseek(fd, -3, SeekWhence::Cur).unwrap(), 3);
    assert_eq!(kernel.lseek(fd, 0, SeekWhence::End).unwrap(), 10);
    assert_eq!(kernel.lseek(fd, -10, SeekWhence::End).unwrap(), 0);

    let mut buf = [0u8; 4];
    kernel.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"0123");
  }

  #[test]
  fn lseek_before_start_fails() {
    let mut kernel = kernel_with_file("/s", b"abc");
    let fd = kernel.open("/s", OpenFlags::read(), FileMode::default()).unwrap();
    match kernel.lseek(fd, -4, SeekWhence::End) {
      Err(Errno::EINVAL(_)) => (),
      other => panic!("expected EINVAL, got {:?}", other),
    }
  }

  #[test]
  fn sparse_seek_past_end_reads_back_zeros() {
    let mut kernel = Kernel::new();
    let fd = kernel
      .open("/sparse", OpenFlags::create(OpenMode::ReadWrite), FileMode::new(S_IRWXU))
      .unwrap();
    let gap = 10_000;
    assert_eq!(kernel.lseek(fd, gap, SeekWhence::End).unwrap(), gap);
    kernel.write(fd, b"!").unwrap();

    assert_eq!(kernel.fstat(fd).unwrap().size as i64, gap + 1);
    let mut buf = vec![0xffu8; gap as usize + 1];
    assert_eq!(kernel.pread(fd, &mut buf, 0).unwrap(), gap as usize + 1);
    assert!(buf[..gap as usize].iter().all(|byte| *byte == 0));
    assert_eq!(buf[gap as usize], b'!');
  }

  #[test]
  fn pread_pwrite_leave_cursor_alone() {
    let mut kernel = kernel_with_file("/p", b"abcdef");
    let fd = kernel.open("/p", OpenFlags::create(OpenMode::ReadWrite), FileMode::default()).unwrap();

    let mut buf = [0u8; 2];
    assert_eq!(kernel.pread(fd, &mut buf, 2).unwrap(), 2);
    assert_eq!(&buf, b"cd");
    kernel.pwrite(fd, b"XY", 4).unwrap();

    // the streaming cursor still sits at the start
    let mut all = [0u8; 8];
    let read = kernel.read(fd, &mut all).unwrap();
    assert_eq!(&all[..read], b"abcdXY");
  }

  #[test]
  fn unlink_while_open_keeps_descriptor_usable() {
    let mut kernel = kernel_with_file("/ghost", b"boo");
    let fd = kernel.open("/ghost", OpenFlags::read(), FileMode::default()).unwrap();

    kernel.unlink("/ghost").unwrap();
    // no new open can reach it
    match kernel.open("/ghost", OpenFlags::read(), FileMode::default()) {
      Err(Errno::ENOENT(_)) => (),
      other => panic!("expected ENOENT, got {:?}", other),
    }
    // but the live descriptor still reads and stats
    assert_eq!(kernel.fstat(fd).unwrap().size, 3);
    let mut buf = [0u8; 8];
    assert_eq!(kernel.read(fd, &mut buf).unwrap(), 3);
    kernel.close(fd).unwrap();
  }

  #[test]
  fn unlink_last_link_frees_immediately() {
    let mut kernel = kernel_with_file("/once", b"bytes");
    kernel.unlink("/once").unwrap();
    match kernel.stat("/once") {
      Err(Errno::ENOTDIR(_)) => (),
      other => panic!("expected ENOTDIR, got {:?}", other),
    }
  }

  #[test]
  fn link_shares_content_and_counts() {
    let mut kernel = kernel_with_file("/orig", b"shared");
    kernel.mkdir("/d", FileMode::new(S_IRWXU)).unwrap();
    kernel.link("/orig", "/d/copy").unwrap();

    assert_eq!(kernel.stat("/orig").unwrap().links_count, 2);
    assert_eq!(kernel.stat("/d/copy").unwrap().size, 6);

    kernel.unlink("/orig").unwrap();
    assert_eq!(kernel.stat("/d/copy").unwrap().links_count, 1);
  }

  #[test]
  fn link_leaves_source_directory_intact() {
    let mut kernel = kernel_with_file("/a", b"first");
    for name in ["/m", "/z"] {
      let fd = kernel
        .open(name, OpenFlags::create(OpenMode::Write), FileMode::new(S_IRWXU))
        .unwrap();
      kernel.close(fd).unwrap();
    }

    kernel.link("/a", "/d/x").unwrap();

    // linking elsewhere must not disturb the old directory's entry list
    assert!(kernel.stat("/m").is_ok());
    assert!(kernel.stat("/z").is_ok());
    assert_eq!(kernel.stat("/a").unwrap().links_count, 2);
    assert_eq!(kernel.stat("/d/x").unwrap().size, 5);
  }

  #[test]
  fn link_refuses_directories_and_existing_targets() {
    let mut kernel = kernel_with_file("/f", b"x");
    kernel.mkdir("/d", FileMode::new(S_IRWXU)).unwrap();

    match kernel.link("/d", "/d2") {
      Err(Errno::EPERM(_)) => (),
      other => panic!("expected EPERM, got {:?}", other),
    }
    match kernel.link("/f", "/d") {
      Err(Errno::EEXIST(_)) => (),
      other => panic!("expected EEXIST, got {:?}", other),
    }
  }

  #[test]
  fn mkdir_rmdir_cycle() {
    let mut kernel = Kernel::new();
    kernel.mkdir("/a", FileMode::new(S_IRWXU)).unwrap();
    kernel.mkdir("/a/b", FileMode::new(S_IRWXU)).unwrap();

    match kernel.mkdir("/a", FileMode::new(S_IRWXU)) {
      Err(Errno::EEXIST(_)) => (),
      other => panic!("expected EEXIST, got {:?}", other),
    }
    match kernel.rmdir("/a") {
      Err(Errno::ENOTEMPTY(_)) => (),
      other => panic!("expected ENOTEMPTY, got {:?}", other),
    }
    kernel.rmdir("/a/b").unwrap();
    kernel.rmdir("/a").unwrap();
    match kernel.stat("/a") {
      Err(Errno::ENOTDIR(_)) => (),
      other => panic!("expected ENOTDIR, got {:?}", other),
    }
  }

  #[test]
  fn stat_reports_mode_and_size() {
    let mut kernel = kernel_with_file("/m", b"12345");
    let stat = kernel.stat("/m").unwrap();
    assert_eq!(stat.size, 5);
    assert_eq!(stat.links_count, 1);
    assert_eq!(stat.block_size as usize, FS_CHUNK_SIZE);
    assert_eq!(stat.mode.r#type(), FileType::File);
  }

  #[test]
  fn truncate_monotonicity() {
    let mut kernel = kernel_with_file("/tr", b"abcdefgh");
    kernel.truncate("/tr", 3).unwrap();
    assert_eq!(kernel.stat("/tr").unwrap().size, 3);

    kernel.truncate("/tr", 12).unwrap();
    assert_eq!(kernel.stat("/tr").unwrap().size, 12);
    let fd = kernel.open("/tr", OpenFlags::read(), FileMode::default()).unwrap();
    let mut buf = [0u8; 12];
    kernel.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(&buf[3..], &[0u8; 9]);
  }

  #[test]
  fn ftruncate_needs_write_access() {
    let mut kernel = kernel_with_file("/ft", b"abc");
    let fd = kernel.open("/ft", OpenFlags::read(), FileMode::default()).unwrap();
    match kernel.ftruncate(fd, 1) {
      Err(Errno::EBADF(_)) => (),
      other => panic!("expected EBADF, got {:?}", other),
    }
  }

  #[test]
  fn readdir_walks_sorted_entries() {
    let mut kernel = Kernel::new();
    for name in ["/dir/c", "/dir/a", "/dir/b"] {
      let fd = kernel
        .open(name, OpenFlags::create(OpenMode::Write), FileMode::new(S_IRWXU))
        .unwrap();
      kernel.close(fd).unwrap();
    }

    let dir = kernel.opendir("/dir").unwrap();
    let mut names = Vec::new();
    while let Some(entry) = kernel.readdir(dir).unwrap() {
      assert_eq!(entry.file_type, FileType::File);
      names.push(entry.name);
    }
    assert_eq!(names, vec!["a", "b", "c"]);

    // rewind and tell
    kernel.seekdir(dir, 1).unwrap();
    assert_eq!(kernel.telldir(dir).unwrap(), 1);
    assert_eq!(kernel.readdir(dir).unwrap().unwrap().name, "b");

    // past the end is an error, exactly at the end is a clean None
    kernel.seekdir(dir, 10).unwrap();
    match kernel.readdir(dir) {
      Err(Errno::ENOENT(_)) => (),
      other => panic!("expected ENOENT, got {:?}", other),
    }
    kernel.seekdir(dir, 3).unwrap();
    assert_eq!(kernel.readdir(dir).unwrap(), None);
    kernel.closedir(dir).unwrap();
  }

  #[test]
  fn close_twice_is_ebadf() {
    let mut kernel = kernel_with_file("/c", b"x");
    let fd = kernel.open("/c", OpenFlags::read(), FileMode::default()).unwrap();
    kernel.close(fd).unwrap();
    match kernel.close(fd) {
      Err(Errno::EBADF(_)) => (),
      other => panic!("expected EBADF, got {:?}", other),
    }
  }

  #[test]
  fn descriptors_reuse_lowest_slot() {
    let mut kernel = kernel_with_file("/x", b"x");
    let first = kernel.open("/x", OpenFlags::read(), FileMode::default()).unwrap();
    let second = kernel.open("/x", OpenFlags::read(), FileMode::default()).unwrap();
    kernel.close(first).unwrap();
    let third = kernel.open("/x", OpenFlags::read(), FileMode::default()).unwrap();
    assert_eq!(third, first);
    assert_ne!(second, third);
  }

  #[test]
  fn write_only_mode_blocks_reads() {
    let mut kernel = Kernel::new();
    let node = kernel.tree.create_file(None, FileMode::new(S_IWUSR));
    let root = kernel.tree.root();
    kernel.tree.link(root, node, b"wo").unwrap();

    let fd = kernel.open("/wo", OpenFlags::write(), FileMode::default()).unwrap();
    let mut buf = [0u8; 4];
    match kernel.read(fd, &mut buf) {
      Err(Errno::EBADF(_)) => (),
      other => panic!("expected EBADF, got {:?}", other),
    }
  }

  #[test]
  fn creating_open_rejects_overlong_name() {
    let mut kernel = Kernel::new();
    let pathname = format!("/{}", "x".repeat(FS_NAME_LENGTH + 1));
    match kernel.open(&pathname, OpenFlags::create(OpenMode::Write), FileMode::new(S_IRWXU)) {
      Err(Errno::ENAMETOOLONG(_)) => (),
      other => panic!("expected ENAMETOOLONG, got {:?}", other),
    }
  }

  #[test]
  fn errno_codes_match_posix() {
    assert_eq!(Errno::EPERM("x").code(), 1);
    assert_eq!(Errno::ENOENT("x").code(), 2);
    assert_eq!(Errno::EBADF("x").code(), 9);
    assert_eq!(Errno::EINVAL("x").code(), 22);
    assert_eq!(Errno::ENOTEMPTY("x").code(), 39);
  }

  #[test]
  fn stdio_descriptors_are_ttys() {
    let kernel = Kernel::new();
    assert!(kernel.isatty(STDIN_FILENO));
    assert!(kernel.isatty(STDOUT_FILENO));
    assert!(kernel.isatty(STDERR_FILENO));
    assert!(!kernel.isatty(3));
  }
}

// vim:ts=2 sw=2
