use itertools::Itertools;

use crate::sandfs::fs::{AddressSize, FileMode, FileStat, FileType, OpenFlags, OpenMode, S_IRWXU};
use crate::sandfs::kernel::{Args, Errno, Kernel};
use crate::util::{self, lossy};

pub const EXIT_SUCCESS: AddressSize = 0;
pub const EXIT_FAILURE: AddressSize = 1;
pub const EXIT_ENOENT: AddressSize = 127;

// FS reading stuff

pub fn ls(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = args.get(1).map(String::as_str).unwrap_or("/");

  let dir = match kernel.opendir(pathname) {
    Ok(dir) => dir,
    Err(Errno::ENOTDIR(_)) => {
      println!("ls: not a directory: {pathname}");
      return EXIT_FAILURE;
    }
    Err(Errno::ENOENT(_)) => {
      println!("ls: no such directory: {pathname}");
      return EXIT_ENOENT;
    }
    Err(errno) => {
      println!("ls: unexpected error: {errno:?}");
      return EXIT_FAILURE;
    }
  };

  loop {
    let entry = match kernel.readdir(dir) {
      Ok(Some(entry)) => entry,
      Ok(None) => break,
      Err(errno) => {
        println!("ls: unexpected error: {errno:?}");
        return EXIT_FAILURE;
      }
    };

    let child_pathname = format!("{}/{}", pathname.trim_end_matches('/'), entry.name);
    let stat = kernel
      .stat(&child_pathname)
      .expect("ls: we know the entry exists");

    println!(
      "{}\t{}\t{}\t{}",
      util::mode_string(stat.mode),
      stat.links_count,
      stat.size,
      entry.name
    );
  }

  if let Err(errno) = kernel.closedir(dir) {
    println!("ls: unexpected error: {errno:?}");
    return EXIT_FAILURE;
  }
  EXIT_SUCCESS
}

pub fn cat(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("cat: missing operand");
      return EXIT_FAILURE;
    }
  };

  let fd = match kernel.open(pathname, OpenFlags::read(), FileMode::default()) {
    Ok(fd) => fd,
    Err(Errno::ENOENT(_)) => {
      println!("cat: no such file: {pathname}");
      return EXIT_ENOENT;
    }
    Err(errno) => {
      println!("cat: can't open {pathname}: {errno:?}");
      return EXIT_FAILURE;
    }
  };

  let mut contents = Vec::new();
  let mut buf = [0u8; 4096];
  loop {
    match kernel.read(fd, &mut buf) {
      Ok(0) => break,
      Ok(read) => contents.extend_from_slice(&buf[..read]),
      Err(errno) => {
        println!("cat: read failed: {errno:?}");
        kernel.close(fd).expect("cat: fd is open");
        return EXIT_FAILURE;
      }
    }
  }
  kernel.close(fd).expect("cat: fd is open");

  println!("{}", lossy(&contents));
  EXIT_SUCCESS
}

pub fn stat(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("stat: missing operand");
      return EXIT_FAILURE;
    }
  };

  let FileStat {
    mode,
    links_count,
    size,
    block_size,
  } = match kernel.stat(pathname) {
    Ok(stat) => stat,
    Err(_) => {
      println!("stat: no such file or directory: {pathname}");
      return EXIT_ENOENT;
    }
  };

  let file_type = match mode.r#type() {
    FileType::Directory => "directory",
    FileType::File => "regular file",
  };
  println!("  File: {pathname}");
  println!("  Size: {size}\tBlock size: {block_size}\t{file_type}");
  println!(" Links: {links_count}\tAccess: ({})", util::mode_string(mode));
  EXIT_SUCCESS
}

// FS writing stuff

pub fn write(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("write: missing operand");
      return EXIT_FAILURE;
    }
  };
  let contents = args.iter().skip(2).join(" ");

  let mut flags = OpenFlags::create(OpenMode::Write);
  flags.truncate = true;
  let fd = match kernel.open(pathname, flags, FileMode::new(S_IRWXU)) {
    Ok(fd) => fd,
    Err(errno) => {
      println!("write: can't open {pathname}: {errno:?}");
      return EXIT_FAILURE;
    }
  };
  if let Err(errno) = kernel.write(fd, contents.as_bytes()) {
    println!("write: write failed: {errno:?}");
    kernel.close(fd).expect("write: fd is open");
    return EXIT_FAILURE;
  }
  kernel.close(fd).expect("write: fd is open");
  EXIT_SUCCESS
}

pub fn mkdir(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("mkdir: missing operand");
      return EXIT_FAILURE;
    }
  };
  match kernel.mkdir(pathname, FileMode::new(S_IRWXU)) {
    Ok(()) => EXIT_SUCCESS,
    Err(Errno::EEXIST(_)) => {
      println!("mkdir: already exists: {pathname}");
      EXIT_FAILURE
    }
    Err(errno) => {
      println!("mkdir: can't create {pathname}: {errno:?}");
      EXIT_FAILURE
    }
  }
}

pub fn ln(args: Args, kernel: &mut Kernel) -> AddressSize {
  let (old, new) = match (args.get(1), args.get(2)) {
    (Some(old), Some(new)) => (old, new),
    _ => {
      println!("ln: usage: ln <target> <linkpath>");
      return EXIT_FAILURE;
    }
  };
  match kernel.link(old, new) {
    Ok(()) => EXIT_SUCCESS,
    Err(errno) => {
      println!("ln: can't link {old} to {new}: {errno:?}");
      EXIT_FAILURE
    }
  }
}

pub fn rm(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("rm: missing operand");
      return EXIT_FAILURE;
    }
  };
  match kernel.unlink(pathname) {
    Ok(()) => EXIT_SUCCESS,
    Err(errno) => {
      println!("rm: can't remove {pathname}: {errno:?}");
      EXIT_FAILURE
    }
  }
}

pub fn rmdir(args: Args, kernel: &mut Kernel) -> AddressSize {
  let pathname = match args.get(1) {
    Some(pathname) => pathname,
    None => {
      println!("rmdir: missing operand");
      return EXIT_FAILURE;
    }
  };
  match kernel.rmdir(pathname) {
    Ok(()) => EXIT_SUCCESS,
    Err(Errno::ENOTEMPTY(_)) => {
      println!("rmdir: directory not empty: {pathname}");
      EXIT_FAILURE
    }
    Err(errno) => {
      println!("rmdir: can't remove {pathname}: {errno:?}");
      EXIT_FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandfs::kernel::Kernel;

  fn args(words: &[&str]) -> Args {
    words.iter().map(|word| (*word).to_owned()).collect()
  }

  #[test]
  fn write_then_cat_roundtrip() {
    let mut kernel = Kernel::new();
    assert_eq!(write(args(&["write", "/f", "hello", "world"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(kernel.stat("/f").unwrap().size, 11);
    assert_eq!(cat(args(&["cat", "/f"]), &mut kernel), EXIT_SUCCESS);
  }

  #[test]
  fn cat_missing_file() {
    let mut kernel = Kernel::new();
    assert_eq!(cat(args(&["cat", "/nope"]), &mut kernel), EXIT_ENOENT);
  }

  #[test]
  fn mkdir_rm_cycle() {
    let mut kernel = Kernel::new();
    assert_eq!(mkdir(args(&["mkdir", "/d"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(mkdir(args(&["mkdir", "/d"]), &mut kernel), EXIT_FAILURE);
    assert_eq!(rmdir(args(&["rmdir", "/d"]), &mut kernel), EXIT_SUCCESS);
  }

  #[test]
  fn ls_lists_root() {
    let mut kernel = Kernel::new();
    write(args(&["write", "/a", "x"]), &mut kernel);
    assert_eq!(ls(args(&["ls"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(ls(args(&["ls", "/a"]), &mut kernel), EXIT_FAILURE);
  }

  #[test]
  fn ln_then_rm_keeps_other_name() {
    let mut kernel = Kernel::new();
    write(args(&["write", "/orig", "data"]), &mut kernel);
    assert_eq!(mkdir(args(&["mkdir", "/d"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(ln(args(&["ln", "/orig", "/d/any"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(rm(args(&["rm", "/orig"]), &mut kernel), EXIT_SUCCESS);
    assert_eq!(kernel.stat("/d/any").unwrap().size, 4);
  }
}

// vim:ts=2 sw=2
