//! I/O capabilities a [`DeviceCgroup`](crate::devices::DeviceCgroup) depends on.
//!
//! Production code uses [`FsLineWriter`] and [`FsDirReader`]. Tests substitute
//! the generated `MockLineWriter` and `MockDirReader` to inject failures that a
//! real filesystem will not produce on demand.
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Writes a single device rule to an opened control file.
#[cfg_attr(test, automock)]
pub trait LineWriter {
    /// Writes `line` followed by a newline to `file`.
    fn write_line(&self, file: &mut File, line: &str) -> io::Result<()>;
}

/// An immediate entry of a cgroup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub is_dir: bool,
}

impl DirEntryInfo {
    pub fn file<N: Into<OsString>>(name: N) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir<N: Into<OsString>>(name: N) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Lists the immediate entries of a directory.
#[cfg_attr(test, automock)]
pub trait DirReader {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsLineWriter;

impl LineWriter for FsLineWriter {
    fn write_line(&self, file: &mut File, line: &str) -> io::Result<()> {
        // the kernel parses exactly one rule per write(2)
        file.write_all(format!("{line}\n").as_bytes())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirReader;

impl DirReader for FsDirReader {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // symlinks are not followed, a link to a directory is not a child cgroup
            let is_dir = entry.file_type()?.is_dir();
            entries.push(DirEntryInfo {
                name: entry.file_name(),
                is_dir,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{read_to_string, OpenOptions};

    use super::*;
    use crate::test::set_fixture;

    #[test]
    fn test_write_line_appends_newline() {
        let tmp = tempfile::tempdir().unwrap();
        let path = set_fixture(tmp.path(), "devices.allow", "").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();

        FsLineWriter.write_line(&mut file, "c 1:3 rwm").unwrap();
        FsLineWriter.write_line(&mut file, "c 1:5 rwm").unwrap();

        assert_eq!(read_to_string(&path).unwrap(), "c 1:3 rwm\nc 1:5 rwm\n");
    }

    #[test]
    fn test_read_dir_reports_directories() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), "devices.list", "").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();

        let mut entries = FsDirReader.read_dir(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(
            entries,
            vec![DirEntryInfo::file("devices.list"), DirEntryInfo::dir("nested")]
        );
    }

    #[test]
    fn test_read_dir_does_not_follow_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(target.path(), tmp.path().join("link")).unwrap();

        let entries = FsDirReader.read_dir(tmp.path()).unwrap();
        assert_eq!(entries, vec![DirEntryInfo::file("link")]);
    }

    #[test]
    fn test_read_dir_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FsDirReader.read_dir(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
