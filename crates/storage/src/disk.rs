use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// File system operations used by [`crate::ProjectStore`]
pub trait Disk {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `bytes` to a freshly created temporary file
    fn write(&self, file: &mut File, bytes: &[u8]) -> io::Result<()>;
}

/// The real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct OsDisk;

impl Disk for OsDisk {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        file.write_all(bytes)
    }
}
