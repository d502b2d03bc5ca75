use crate::sandfs::fs::FS_PATH_LENGTH;
use crate::sandfs::kernel::Errno;

/// A borrowed view into caller-owned path bytes. Every operation returns a
/// sub-view of the same allocation, nothing here ever copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path<'a> {
  bytes: &'a [u8],
}

impl<'a> Path<'a> {
  pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, Errno> {
    // Guard for overlong paths
    if bytes.len() >= FS_PATH_LENGTH {
      return Err(Errno::ENAMETOOLONG("paths: path exceeds FS_PATH_LENGTH"));
    }
    Ok(Self { bytes })
  }

  pub fn from_str(pathname: &'a str) -> Result<Self, Errno> {
    Self::from_bytes(pathname.as_bytes())
  }

  pub fn as_bytes(&self) -> &'a [u8] {
    self.bytes
  }
  pub fn len(&self) -> usize {
    self.bytes.len()
  }
  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// First component of the path: skips leading separators, then spans up to
  /// the next separator or the end. Empty result means the path is exhausted.
  pub fn next_component(&self) -> Path<'a> {
    let mut index = 0;
    while index < self.bytes.len() && self.bytes[index] == b'/' {
      index += 1;
    }
    let rest = &self.bytes[index..];

    let mut end = 0;
    while end < rest.len() && rest[end] != b'/' {
      end += 1;
    }

    Path { bytes: &rest[..end] }
  }

  /// Extract the first component and shrink `self` to everything after it.
  pub fn advance(&mut self) -> Path<'a> {
    let mut index = 0;
    while index < self.bytes.len() && self.bytes[index] == b'/' {
      index += 1;
    }
    let rest = &self.bytes[index..];

    let mut end = 0;
    while end < rest.len() && rest[end] != b'/' {
      end += 1;
    }

    self.bytes = &rest[end..];
    Path { bytes: &rest[..end] }
  }

  /// Everything before the last separator, with trailing separators
  /// ignored. "/a/b/c" -> "/a/b", "/a/b/" -> "/a", "c" -> "".
  pub fn directories(&self) -> Path<'a> {
    let mut end = self.bytes.len();
    while end > 0 && self.bytes[end - 1] == b'/' {
      end -= 1;
    }
    let trimmed = &self.bytes[..end];

    let mut last_slash: Option<usize> = None;
    for (index, byte) in trimmed.iter().enumerate() {
      if *byte == b'/' {
        last_slash = Some(index);
      }
    }
    let length = match last_slash {
      Some(index) if index > 0 => index,
      _ => 0,
    };
    Path { bytes: &trimmed[..length] }
  }

  /// Final component: everything after the last separator, with trailing
  /// separators ignored. "/a/b/c" -> "c", "/a/b/" -> "b".
  pub fn file_name(&self) -> Path<'a> {
    if self.bytes.is_empty() {
      return *self;
    }
    let mut start = self.bytes.len() - 1;
    // skip trailing '/'
    while start > 0 && self.bytes[start] == b'/' {
      start -= 1;
    }
    let end = start + 1;
    // count backwards until we hit '/'
    while start > 0 && self.bytes[start] != b'/' {
      start -= 1;
    }
    if self.bytes[start] == b'/' {
      start += 1;
    }
    Path { bytes: &self.bytes[start..end] }
  }
}

#[cfg(test)]
mod path_component_tests {
  use super::*;

  fn components(pathname: &str) -> Vec<String> {
    let mut path = Path::from_str(pathname).unwrap();
    let mut result = Vec::new();
    loop {
      let component = path.advance();
      if component.is_empty() {
        break;
      }
      result.push(String::from_utf8(component.as_bytes().to_vec()).unwrap());
    }
    result
  }

  #[test]
  fn components_absolute() {
    assert_eq!(components("/a/b/c"), vec!["a", "b", "c"]);
  }
  #[test]
  fn components_relative() {
    assert_eq!(components("a/b"), vec!["a", "b"]);
  }
  #[test]
  fn components_repeated_slashes() {
    assert_eq!(components("//a///b//"), vec!["a", "b"]);
  }
  #[test]
  fn components_root() {
    assert_eq!(components("/"), Vec::<String>::new());
    assert_eq!(components(""), Vec::<String>::new());
  }
  #[test]
  fn components_dots_are_plain_components() {
    assert_eq!(components("/a/./../b"), vec!["a", ".", "..", "b"]);
  }
}

#[cfg(test)]
mod path_split_tests {
  use super::*;

  fn split(pathname: &str) -> (String, String) {
    let path = Path::from_str(pathname).unwrap();
    (
      String::from_utf8(path.directories().as_bytes().to_vec()).unwrap(),
      String::from_utf8(path.file_name().as_bytes().to_vec()).unwrap(),
    )
  }

  #[test]
  fn split_deep() {
    assert_eq!(split("/a/b/c"), ("/a/b".to_owned(), "c".to_owned()));
  }
  #[test]
  fn split_toplevel() {
    assert_eq!(split("/c"), ("".to_owned(), "c".to_owned()));
  }
  #[test]
  fn split_bare_name() {
    assert_eq!(split("c"), ("".to_owned(), "c".to_owned()));
  }
  #[test]
  fn split_trailing_slash() {
    assert_eq!(split("/a/b/"), ("/a".to_owned(), "b".to_owned()));
  }
  #[test]
  fn split_repeated_trailing_slashes() {
    assert_eq!(split("/a/b//"), ("/a".to_owned(), "b".to_owned()));
    assert_eq!(split("/a//"), ("".to_owned(), "a".to_owned()));
  }
  #[test]
  fn split_relative_dir() {
    assert_eq!(split("a/b"), ("a".to_owned(), "b".to_owned()));
  }

  #[test]
  fn overlong_path_is_rejected() {
    let long = vec![b'a'; FS_PATH_LENGTH];
    match Path::from_bytes(&long) {
      Err(Errno::ENAMETOOLONG(_)) => (),
      other => panic!("expected ENAMETOOLONG, got {:?}", other),
    }
  }
}

// vim:ts=2 sw=2
