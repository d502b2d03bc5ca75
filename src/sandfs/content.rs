use crate::sandfs::fs::FS_CHUNK_SIZE;
use crate::sandfs::tree::{ChunkId, NodeId, NodePayload, NodeTree};

/// One storage block of a file. `data` is allocated once, zero-filled, and
/// never resized; `used` tracks how much of it holds file bytes.
#[derive(Debug)]
pub struct Chunk {
  pub data: Vec<u8>,
  pub used: usize,
  pub next: Option<ChunkId>,
}

impl Chunk {
  pub fn capacity(&self) -> usize {
    self.data.len()
  }
}

/// A descriptor's position in a file: the chunk it sits in plus the byte
/// offset inside that chunk. `chunk == None` means "not bound yet" - the
/// next stream operation rebinds to the content head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
  pub chunk: Option<ChunkId>,
  pub offset: usize,
}

impl Cursor {
  pub fn start(head: Option<ChunkId>) -> Self {
    Self { chunk: head, offset: 0 }
  }
  pub fn detached() -> Self {
    Self { chunk: None, offset: 0 }
  }
}

impl NodeTree {
  pub fn chunk(&self, id: ChunkId) -> &Chunk {
    self.chunks[id as usize]
      .as_ref()
      .expect("content: chunk id refers to a freed chunk")
  }

  pub fn chunk_mut(&mut self, id: ChunkId) -> &mut Chunk {
    self.chunks[id as usize]
      .as_mut()
      .expect("content: chunk id refers to a freed chunk")
  }

  fn insert_chunk(&mut self, chunk: Chunk) -> ChunkId {
    if let Some(id) = self.free_chunks.pop() {
      self.chunks[id as usize] = Some(chunk);
      id
    } else {
      self.chunks.push(Some(chunk));
      (self.chunks.len() - 1) as ChunkId
    }
  }

  fn release_chunk(&mut self, id: ChunkId) {
    self.chunks[id as usize] = None;
    self.free_chunks.push(id);
  }

  /// Allocate a fresh zero-filled chunk, capacity rounded up to the next
  /// multiple of `FS_CHUNK_SIZE`.
  pub fn allocate_chunk(&mut self, min_size: usize) -> ChunkId {
    let capacity = (min_size + FS_CHUNK_SIZE - 1) / FS_CHUNK_SIZE * FS_CHUNK_SIZE;
    self.insert_chunk(Chunk {
      data: vec![0; capacity],
      used: 0,
      next: None,
    })
  }

  /// Take over a host-provided buffer as a file's single chunk, no copy.
  pub(crate) fn adopt_buffer(&mut self, data: Vec<u8>) -> ChunkId {
    let used = data.len();
    self.insert_chunk(Chunk { data, used, next: None })
  }

  pub fn content_head(&self, node: NodeId) -> Option<ChunkId> {
    match self.node(node).payload {
      NodePayload::File { content } => content,
      NodePayload::Directory { .. } => None,
    }
  }

  pub(crate) fn set_content_head(&mut self, node: NodeId, head: Option<ChunkId>) {
    match &mut self.node_mut(node).payload {
      NodePayload::File { content } => *content = head,
      NodePayload::Directory { .. } => unreachable!("content: set_content_head on a directory"),
    }
  }

  /// Free a whole chain, returning the freed ids so callers can repair any
  /// cursors that pointed into it.
  pub(crate) fn free_chunk_chain(&mut self, head: Option<ChunkId>) -> Vec<ChunkId> {
    let mut freed = Vec::new();
    let mut current = head;
    while let Some(id) = current {
      current = self.chunk(id).next;
      freed.push(id);
      self.release_chunk(id);
    }
    freed
  }

  /// File size is the sum of `used` over the chain.
  pub fn file_size(&self, node: NodeId) -> usize {
    let mut total = 0;
    let mut current = self.content_head(node);
    while let Some(id) = current {
      let chunk = self.chunk(id);
      total += chunk.used;
      current = chunk.next;
    }
    total
  }

  /// Copy out of the chain starting at (chunk, offset). Returns the bytes
  /// copied and the final position. At end-of-content the position sticks at
  /// the last chunk's boundary instead of running off the chain, so appends
  /// made later become visible to the same cursor without reseeking.
  fn copy_out(&self, start: ChunkId, start_offset: usize, buf: &mut [u8]) -> (usize, ChunkId, usize) {
    let mut current = start;
    let mut chunk_offset = start_offset;
    let mut read_bytes = 0;
    loop {
      let chunk = self.chunk(current);
      let readable = chunk.used.saturating_sub(chunk_offset);
      let needed = buf.len() - read_bytes;
      if readable > needed {
        buf[read_bytes..].copy_from_slice(&chunk.data[chunk_offset..chunk_offset + needed]);
        read_bytes += needed;
        chunk_offset += needed;
        break;
      }
      buf[read_bytes..read_bytes + readable].copy_from_slice(&chunk.data[chunk_offset..chunk_offset + readable]);
      read_bytes += readable;
      match chunk.next {
        Some(next) => {
          current = next;
          chunk_offset = 0;
          if read_bytes == buf.len() {
            break;
          }
        }
        None => {
          chunk_offset += readable;
          break;
        }
      }
    }
    (read_bytes, current, chunk_offset)
  }

  /// Streaming read: starts at the cursor and advances it.
  pub fn read_stream(&self, node: NodeId, cursor: &mut Cursor, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
      return 0;
    }
    if cursor.chunk.is_none() {
      cursor.offset = 0;
      match self.content_head(node) {
        Some(head) => cursor.chunk = Some(head),
        None => return 0,
      }
    }
    let start = cursor.chunk.expect("content: cursor bound above");
    let (read_bytes, chunk, offset) = self.copy_out(start, cursor.offset, buf);
    cursor.chunk = Some(chunk);
    cursor.offset = offset;
    read_bytes
  }

  /// Positioned read: starts at an absolute file offset, touches no cursor.
  /// Reading at or past end-of-content returns 0.
  pub fn read_at_offset(&self, node: NodeId, offset: usize, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
      return 0;
    }
    let mut current = match self.content_head(node) {
      Some(head) => head,
      None => return 0,
    };
    let mut remaining = offset;
    let mut chunk_offset = 0;
    while remaining > 0 {
      let chunk = self.chunk(current);
      if chunk.used < remaining {
        remaining -= chunk.used;
        match chunk.next {
          Some(next) => current = next,
          None => return 0,
        }
      } else {
        chunk_offset = remaining;
        break;
      }
    }
    let (read_bytes, _, _) = self.copy_out(current, chunk_offset, buf);
    read_bytes
  }

  /// Copy into the chain starting at (chunk, offset), overwriting existing
  /// bytes and growing `used` / appending chunks as needed. Returns bytes
  /// written and the final position.
  fn copy_in(&mut self, start: ChunkId, start_offset: usize, bytes: &[u8]) -> (usize, ChunkId, usize) {
    let mut current = start;
    let mut offset = start_offset;
    let mut written = 0;
    loop {
      let writable = self.chunk(current).capacity() - offset;
      if writable == 0 {
        match self.chunk(current).next {
          Some(next) => {
            current = next;
            offset = 0;
          }
          None => {
            let fresh = self.allocate_chunk(bytes.len() - written);
            self.chunk_mut(current).next = Some(fresh);
            current = fresh;
            offset = 0;
          }
        }
        continue;
      }
      let to_write = (bytes.len() - written).min(writable);
      let chunk = self.chunk_mut(current);
      chunk.data[offset..offset + to_write].copy_from_slice(&bytes[written..written + to_write]);
      offset += to_write;
      written += to_write;
      if chunk.used < offset {
        chunk.used = offset;
      }
      if written == bytes.len() {
        break;
      }
    }
    (written, current, offset)
  }

  /// Streaming write at the cursor, advancing it. Binds an unbound cursor to
  /// the content head, allocating the first chunk when the file is empty.
  pub fn write_stream(&mut self, node: NodeId, cursor: &mut Cursor, bytes: &[u8]) -> usize {
    if bytes.is_empty() {
      return 0;
    }
    if cursor.chunk.is_none() {
      cursor.offset = 0;
      match self.content_head(node) {
        Some(head) => cursor.chunk = Some(head),
        None => {
          let fresh = self.allocate_chunk(bytes.len());
          self.set_content_head(node, Some(fresh));
          cursor.chunk = Some(fresh);
        }
      }
    }
    let start = cursor.chunk.expect("content: cursor bound above");
    let (written, chunk, offset) = self.copy_in(start, cursor.offset, bytes);
    cursor.chunk = Some(chunk);
    cursor.offset = offset;
    written
  }

  /// Positioned write at an absolute file offset. Walks the chain by
  /// capacity, marking any newly uncovered gap as used (the buffers are
  /// zero-filled, so gaps read back as zeros), then writes from there.
  pub fn write_at_offset(&mut self, node: NodeId, offset: usize, bytes: &[u8]) -> usize {
    let head = match self.content_head(node) {
      Some(head) => head,
      None => {
        let fresh = self.allocate_chunk(offset + bytes.len());
        self.chunk_mut(fresh).used = offset;
        self.set_content_head(node, Some(fresh));
        let (written, _, _) = self.copy_in(fresh, offset, bytes);
        return written;
      }
    };

    let mut current = head;
    let mut remaining = offset;
    let chunk_offset;
    loop {
      let capacity = self.chunk(current).capacity();
      if remaining < capacity {
        chunk_offset = remaining;
        let chunk = self.chunk_mut(current);
        if chunk.used < remaining {
          chunk.used = remaining;
        }
        break;
      }
      remaining -= capacity;
      match self.chunk(current).next {
        Some(next) => current = next,
        None => {
          let fresh = self.allocate_chunk(remaining + bytes.len());
          self.chunk_mut(fresh).used = remaining;
          self.chunk_mut(current).next = Some(fresh);
          current = fresh;
          chunk_offset = remaining;
          break;
        }
      }
    }
    let (written, _, _) = self.copy_in(current, chunk_offset, bytes);
    written
  }

  /// Clamp the file to `new_length` bytes, freeing any chunks past the cut,
  /// or pad it with one zero-filled chunk when growing. Returns the freed
  /// chunk ids so the caller can repair cursors that pointed into the tail.
  pub fn truncate_content(&mut self, node: NodeId, new_length: usize) -> Vec<ChunkId> {
    let head = match self.content_head(node) {
      Some(head) => head,
      None => {
        if new_length > 0 {
          let fresh = self.allocate_chunk(new_length);
          self.chunk_mut(fresh).used = new_length;
          self.set_content_head(node, Some(fresh));
        }
        return Vec::new();
      }
    };

    let mut current = head;
    let mut remaining = new_length;
    loop {
      let used = self.chunk(current).used;
      if used >= remaining {
        // the cut-off bytes must stay unreadable even if `used` grows back
        // over them through a later positioned write into a gap
        let chunk = self.chunk_mut(current);
        chunk.data[remaining..used].fill(0);
        chunk.used = remaining;
        let tail = self.chunk(current).next;
        self.chunk_mut(current).next = None;
        return self.free_chunk_chain(tail);
      }
      remaining -= used;
      match self.chunk(current).next {
        Some(next) => current = next,
        None => break,
      }
    }
    // ran out of chunks before reaching the new length: pad with zeros
    let fresh = self.allocate_chunk(remaining);
    self.chunk_mut(fresh).used = remaining;
    self.chunk_mut(current).next = Some(fresh);
    Vec::new()
  }

  /// Reassemble the file into one contiguous buffer. A single-chunk file
  /// hands its buffer over without copying (detaching the content); longer
  /// chains are concatenated.
  pub fn materialize(&mut self, node: NodeId) -> Vec<u8> {
    let head = match self.content_head(node) {
      Some(head) => head,
      None => return Vec::new(),
    };
    if self.chunk(head).next.is_none() {
      let chunk = self.chunks[head as usize]
        .take()
        .expect("content: head chunk exists");
      self.free_chunks.push(head);
      self.set_content_head(node, None);
      let mut data = chunk.data;
      data.truncate(chunk.used);
      return data;
    }
    let mut out = Vec::with_capacity(self.file_size(node));
    let mut current = Some(head);
    while let Some(id) = current {
      let chunk = self.chunk(id);
      out.extend_from_slice(&chunk.data[..chunk.used]);
      current = chunk.next;
    }
    out
  }
}


// vim:ts=2 sw=2
