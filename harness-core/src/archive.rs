//! Tarball helpers used to move files in and out of a container.

use std::io;
use std::path::Path;

use tracing::trace;

use crate::error::{HarnessError, Result};

/// Unpacks a tar archive into `output_dir`, flattening directory structure
/// the same way the upload/download pair in `ShellChannel` expects.
pub fn unpack_tarball<T: io::Read, P: AsRef<Path>>(
    archive: &mut tar::Archive<T>,
    output_dir: P,
) -> Result<()> {
    let output_dir = output_dir.as_ref();
    let entries = archive
        .entries()
        .map_err(|e| HarnessError::io(output_dir, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| HarnessError::io(output_dir, e))?;
        if let tar::EntryType::Regular = entry.header().entry_type() {
            let path = entry
                .header()
                .path()
                .map_err(|e| HarnessError::io(output_dir, e))?
                .to_path_buf();
            trace!(path = %path.display(), "unpacking");
            let name = path.file_name().unwrap_or_default();
            entry
                .unpack(output_dir.join(name))
                .map_err(|e| HarnessError::io(output_dir, e))?;
        }
    }

    Ok(())
}

/// Builds an in-memory tar archive from an iterator of (path, bytes) pairs.
pub fn create_tarball<'archive, E, P>(entries: E) -> Result<Vec<u8>>
where
    E: Iterator<Item = (P, &'archive [u8])>,
    P: AsRef<Path>,
{
    let buf = Vec::new();
    let mut archive = tar::Builder::new(buf);

    for (path, bytes) in entries {
        let path = path.as_ref();
        trace!(path = %path.display(), size = bytes.len(), "adding entry to tarball");
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_cksum();
        archive
            .append_data(&mut header, path, bytes)
            .map_err(|e| HarnessError::io(path, e))?;
    }

    archive
        .into_inner()
        .map_err(|e| HarnessError::io(Path::new("<tarball>"), e))
}
