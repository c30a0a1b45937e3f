use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use oci_spec::runtime::LinuxDeviceCgroup;

use crate::backend::{DirReader, FsDirReader, FsLineWriter, LineWriter};
use crate::common::{
    self, JoinSafelyError, PathBufExt, WrapIoResult, WrappedIoError, DEVICES_ALLOW,
    DEVICES_CONTROL_FILES, DEVICES_DENY, DEVICES_LIST,
};
use crate::mount::{self, MountPointError};

#[derive(thiserror::Error, Debug)]
pub enum DeviceCgroupError {
    #[error("not a device cgroup: {path}")]
    NotDeviceCgroup { path: PathBuf },
    #[error(transparent)]
    WrappedIo(#[from] WrappedIoError),
}

impl DeviceCgroupError {
    /// The operating system error behind a failed open, read, write or listing.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            DeviceCgroupError::WrappedIo(err) => Some(err.inner()),
            DeviceCgroupError::NotDeviceCgroup { .. } => None,
        }
    }

    /// True if the cgroup directory or one of its control files has disappeared.
    pub fn is_not_found(&self) -> bool {
        self.io_error()
            .map(|err| err.kind() == std::io::ErrorKind::NotFound)
            .unwrap_or(false)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadRelativeError {
    #[error("failed to locate devices hierarchy: {0}")]
    MountPoint(#[from] MountPointError),
    #[error(transparent)]
    JoinSafely(#[from] JoinSafelyError),
    #[error(transparent)]
    Load(#[from] DeviceCgroupError),
}

/// A devices cgroup directory that exposed `devices.allow`, `devices.deny` and
/// `devices.list` when it was loaded.
///
/// The handle keeps no file open and caches nothing, every call goes to the
/// filesystem again. The kernel alone decides the resulting whitelist, so
/// concurrent callers writing to the same cgroup are not serialized here.
#[derive(Debug, Clone)]
pub struct DeviceCgroup<W = FsLineWriter, R = FsDirReader> {
    path: PathBuf,
    writer: W,
    reader: R,
}

impl DeviceCgroup {
    /// Binds to the devices cgroup at `path`.
    ///
    /// Fails with [`DeviceCgroupError::NotDeviceCgroup`] if the directory can be
    /// listed but lacks one of the control files, or with an I/O error if it
    /// cannot be listed at all.
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self, DeviceCgroupError> {
        Self::load_with(path, FsLineWriter, FsDirReader)
    }

    /// Binds to a cgroup given relative to the mount point of the devices hierarchy,
    /// e.g. `docker/<id>` for `/sys/fs/cgroup/devices/docker/<id>`.
    pub fn load_relative<P: AsRef<Path>>(cgroup_path: P) -> Result<Self, LoadRelativeError> {
        let mount_point = mount::get_devices_mount_point()?;
        let path = mount_point.join_safely(cgroup_path)?;
        Ok(Self::load(path)?)
    }
}

impl<W: LineWriter, R: DirReader> DeviceCgroup<W, R> {
    /// Same as [`DeviceCgroup::load`], with custom I/O backends. Validation goes
    /// through `reader`.
    pub fn load_with<P: Into<PathBuf>>(
        path: P,
        writer: W,
        reader: R,
    ) -> Result<Self, DeviceCgroupError> {
        let path = path.into();
        tracing::debug!("load device cgroup at {:?}", path);
        validate_device_cgroup(&path, &reader)?;

        Ok(Self {
            path,
            writer,
            reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the effective whitelist from `devices.list`, one rule per entry in the
    /// order the kernel reports them. The kernel may report a rule in a different
    /// form than it was written in, e.g. `a` reads back as `a *:* rwm`.
    pub fn list(&self) -> Result<Vec<String>, DeviceCgroupError> {
        let path = self.path.join(DEVICES_LIST);
        tracing::debug!("list device rules from {:?}", path);

        let content = common::read_cgroup_file(&path)?;
        let content = content.trim_end();
        if content.is_empty() {
            return Ok(Vec::new());
        }

        Ok(content.split('\n').map(str::to_owned).collect())
    }

    /// Appends each entry as its own line to `devices.allow`.
    ///
    /// The file is opened even if there are no entries. Writing stops at the first
    /// rejected entry, entries written before it stay in effect.
    pub fn allow<I, S>(&self, entries: I) -> Result<(), DeviceCgroupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_entries(DEVICES_ALLOW, entries)
    }

    /// Appends each entry as its own line to `devices.deny`, with the same
    /// guarantees as [`DeviceCgroup::allow`].
    pub fn deny<I, S>(&self, entries: I) -> Result<(), DeviceCgroupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_entries(DEVICES_DENY, entries)
    }

    /// Writes OCI device rules in order, each to `devices.allow` or `devices.deny`
    /// depending on whether it allows access.
    pub fn apply(&self, rules: &[LinuxDeviceCgroup]) -> Result<(), DeviceCgroupError> {
        tracing::debug!("apply {} device rules to {:?}", rules.len(), self.path);

        for group in rules.chunk_by(|a, b| a.allow() == b.allow()) {
            let control_file = if group[0].allow() {
                DEVICES_ALLOW
            } else {
                DEVICES_DENY
            };
            self.write_entries(control_file, group.iter().map(ToString::to_string))?;
        }

        Ok(())
    }

    /// Reports whether any nested cgroup exists directly below this one.
    pub fn has_children(&self) -> Result<bool, DeviceCgroupError> {
        tracing::debug!("check for child cgroups in {:?}", self.path);
        let entries = self
            .reader
            .read_dir(&self.path)
            .wrap_read_dir(&self.path)?;

        Ok(entries.iter().any(|entry| entry.is_dir))
    }

    /// Paths of the nested cgroups directly below this one, sorted by name.
    pub fn children(&self) -> Result<Vec<PathBuf>, DeviceCgroupError> {
        let entries = self
            .reader
            .read_dir(&self.path)
            .wrap_read_dir(&self.path)?;

        let mut children: Vec<PathBuf> = entries
            .into_iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| self.path.join(entry.name))
            .collect();
        children.sort();

        Ok(children)
    }

    fn write_entries<I, S>(&self, control_file: &str, entries: I) -> Result<(), DeviceCgroupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.path.join(control_file);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .wrap_open(&path)?;

        let mut written = 0;
        for entry in entries {
            let entry = entry.as_ref();
            self.writer
                .write_line(&mut file, entry)
                .wrap_write(&path, entry)?;
            written += 1;
        }

        tracing::debug!("wrote {} device rules to {:?}", written, path);
        Ok(())
    }
}

fn validate_device_cgroup<R: DirReader>(path: &Path, reader: &R) -> Result<(), DeviceCgroupError> {
    let entries = reader.read_dir(path).wrap_read_dir(path)?;

    let has_control_files = DEVICES_CONTROL_FILES.into_iter().all(|control_file| {
        entries
            .iter()
            .any(|entry| entry.name.as_os_str() == OsStr::new(control_file))
    });
    if !has_control_files {
        return Err(DeviceCgroupError::NotDeviceCgroup {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}
