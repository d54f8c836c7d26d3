//! Async I/O traits and utilities.
//!
//! Streams handed across the bridge traits (object downloads, file reads and
//! writes) are expressed with these traits.

pub use tokio::io::{
    copy, empty, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite,
    AsyncWriteExt, BufReader, BufWriter,
};

pub use tokio_util::io::{ReaderStream, StreamReader};
