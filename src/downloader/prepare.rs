//! Output file preparation
//!
//! Multi-part downloads size the output file to the full resource length
//! before any part writes occur. On Unix-family platforms this is done with
//! a sparse file (seek past the end, write one byte) so the file occupies
//! no real disk space until parts land; anywhere else, or if the sparse
//! attempt fails, the file is plainly truncated to size.

/// Size `file` to `size` bytes ahead of the part writes.
pub(crate) fn allocate(file: &std::fs::File, size: u64) -> std::io::Result<()> {
    if size == 0 {
        return file.set_len(0);
    }

    #[cfg(unix)]
    match create_sparse(file, size) {
        Ok(()) => return Ok(()),
        Err(err) => {
            tracing::warn!(error = %err, "sparse file creation failed, using regular allocation");
        }
    }

    file.set_len(size)
}

/// Create a sparse file by seeking one byte short of `size` and writing a
/// single zero byte, then rewinding.
#[cfg(unix)]
fn create_sparse(file: &std::fs::File, size: u64) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};

    let mut handle = file;
    handle.seek(SeekFrom::Start(size - 1))?;
    handle.write_all(&[0])?;
    handle.seek(SeekFrom::Start(0))?;
    Ok(())
}
