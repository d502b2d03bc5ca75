use core::fmt::Debug;

pub type AddressSize = u32;
pub type FileDescriptor = AddressSize;

/// Longest file or directory name, including nothing - names are not
/// nul-terminated internally, shorter names are just zero-padded.
pub const FS_NAME_LENGTH: usize = 64;
/// Chunk allocation granularity - every content chunk's capacity is a
/// multiple of this.
pub const FS_CHUNK_SIZE: usize = 4096;
/// Size of the open-file table; slot index == descriptor number.
pub const FS_MAX_FILES: usize = 1024;
/// Longest accepted path string.
pub const FS_PATH_LENGTH: usize = 4096;

pub const STDIN_FILENO: FileDescriptor = 0;
pub const STDOUT_FILENO: FileDescriptor = 1;
pub const STDERR_FILENO: FileDescriptor = 2;

// Mode bits as in sys/stat.h - the libc shim hands these through unchanged.
pub const S_IXUSR: u32 = 0o100;
pub const S_IWUSR: u32 = 0o200;
pub const S_IRUSR: u32 = 0o400;
pub const S_IRWXU: u32 = S_IXUSR | S_IWUSR | S_IRUSR;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFMT: u32 = 0o170000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
  File,
  Directory,
}

/// File type + owner permission bits, laid out exactly like `st_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl Default for FileMode {
  fn default() -> Self {
    Self(S_IFREG | S_IRUSR | S_IWUSR)
  }
}

impl FileMode {
  pub fn new(raw: u32) -> Self {
    Self(raw)
  }
  pub fn regular(perms: u32) -> Self {
    Self(S_IFREG | perms)
  }
  pub fn directory(perms: u32) -> Self {
    Self(S_IFDIR | perms)
  }

  pub fn get_raw(&self) -> u32 {
    self.0
  }
  pub fn r#type(&self) -> FileType {
    if self.0 & S_IFMT == S_IFDIR {
      FileType::Directory
    } else {
      FileType::File
    }
  }
  pub fn is_directory(&self) -> bool {
    self.r#type() == FileType::Directory
  }
  pub fn readable(&self) -> bool {
    self.0 & S_IRUSR != 0
  }
  pub fn writable(&self) -> bool {
    self.0 & S_IWUSR != 0
  }
  pub fn executable(&self) -> bool {
    self.0 & S_IXUSR != 0
  }

  /// Replace permission bits, keep the type bits.
  pub fn with_perms(&self, perms: u32) -> Self {
    Self((self.0 & S_IFMT) | (perms & !S_IFMT))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
  Read,
  Write,
  ReadWrite,
}

impl OpenMode {
  pub fn readable(&self) -> bool {
    matches!(self, OpenMode::Read | OpenMode::ReadWrite)
  }
  pub fn writable(&self) -> bool {
    matches!(self, OpenMode::Write | OpenMode::ReadWrite)
  }
}

/// Flags captured at open time. `mode` and `append` stay relevant for the
/// whole lifetime of the descriptor, the rest only matter during `open`.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
  pub mode: OpenMode,
  pub create: bool,
  pub exclusive: bool,
  pub truncate: bool,
  pub append: bool,
}

impl OpenFlags {
  pub fn read() -> Self {
    Self {
      mode: OpenMode::Read,
      create: false,
      exclusive: false,
      truncate: false,
      append: false,
    }
  }
  pub fn write() -> Self {
    Self {
      mode: OpenMode::Write,
      create: false,
      exclusive: false,
      truncate: false,
      append: false,
    }
  }
  pub fn create(mode: OpenMode) -> Self {
    Self {
      mode,
      create: true,
      exclusive: false,
      truncate: false,
      append: false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
  Set,
  Cur,
  End,
}

/// What `stat`/`fstat` report back to the shim.
#[derive(Debug, PartialEq, Eq)]
pub struct FileStat {
  pub mode: FileMode,
  pub links_count: AddressSize,
  pub size: AddressSize,
  pub block_size: AddressSize,
}


// vim:ts=2 sw=2
