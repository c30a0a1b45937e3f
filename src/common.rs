use std::{
    fs,
    path::{Path, PathBuf, StripPrefixError},
};

use nix::sys::statfs::{statfs, CGROUP_SUPER_MAGIC};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
pub const DEVICES_SUBSYSTEM: &str = "devices";

pub const DEVICES_ALLOW: &str = "devices.allow";
pub const DEVICES_DENY: &str = "devices.deny";
pub const DEVICES_LIST: &str = "devices.list";

/// Control files every devices cgroup directory exposes.
pub const DEVICES_CONTROL_FILES: [&str; 3] = [DEVICES_ALLOW, DEVICES_DENY, DEVICES_LIST];

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open { err: std::io::Error, path: PathBuf },
    #[error("failed to write {data} to {path}: {err}")]
    Write {
        err: std::io::Error,
        path: PathBuf,
        data: String,
    },
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
    #[error("failed to read dir {path}: {err}")]
    ReadDir { err: std::io::Error, path: PathBuf },
    #[error("at {path}: {err}")]
    Other { err: std::io::Error, path: PathBuf },
}

impl WrappedIoError {
    pub fn inner(&self) -> &std::io::Error {
        match self {
            WrappedIoError::Open { err, .. } => err,
            WrappedIoError::Write { err, .. } => err,
            WrappedIoError::Read { err, .. } => err,
            WrappedIoError::ReadDir { err, .. } => err,
            WrappedIoError::Other { err, .. } => err,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WrappedIoError::Open { path, .. } => path,
            WrappedIoError::Write { path, .. } => path,
            WrappedIoError::Read { path, .. } => path,
            WrappedIoError::ReadDir { path, .. } => path,
            WrappedIoError::Other { path, .. } => path,
        }
    }
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| WrappedIoError::Read {
        err,
        path: path.to_path_buf(),
    })
}

/// Reports whether `path` lives on a cgroup v1 filesystem.
pub fn is_cgroup_v1_mount<P: AsRef<Path>>(path: P) -> Result<bool, WrappedIoError> {
    let path = path.as_ref();
    let stat = statfs(path)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
        .wrap_other(path)?;

    Ok(stat.filesystem_type() == CGROUP_SUPER_MAGIC)
}

pub trait PathBufExt {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError>;
}

#[derive(thiserror::Error, Debug)]
pub enum JoinSafelyError {
    #[error("failed to strip prefix from {path}: {err}")]
    StripPrefix {
        err: StripPrefixError,
        path: PathBuf,
    },
}

impl PathBufExt for PathBuf {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf, JoinSafelyError> {
        let path = path.as_ref();
        if path.is_relative() {
            return Ok(self.join(path));
        }

        let stripped = path
            .strip_prefix("/")
            .map_err(|err| JoinSafelyError::StripPrefix {
                err,
                path: path.to_path_buf(),
            })?;
        Ok(self.join(stripped))
    }
}

pub(crate) trait WrapIoResult {
    type Target;

    fn wrap_read_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError>;
    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
}

impl<T> WrapIoResult for Result<T, std::io::Error> {
    type Target = T;

    fn wrap_read_dir<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::ReadDir {
            err,
            path: path.into(),
        })
    }

    fn wrap_open<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Open {
            err,
            path: path.into(),
        })
    }

    fn wrap_write<P: Into<PathBuf>, D: Into<String>>(
        self,
        path: P,
        data: D,
    ) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Write {
            err,
            path: path.into(),
            data: data.into(),
        })
    }

    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Other {
            err,
            path: path.into(),
        })
    }
}
