use std::path::{Path, PathBuf};

use procfs::process::Process;
use procfs::ProcError;

use crate::common::DEVICES_SUBSYSTEM;

#[derive(thiserror::Error, Debug)]
pub enum MountPointError {
    #[error("failed to read process info from /proc/self: {0}")]
    ReadSelf(ProcError),
    #[error("failed to get mountinfo: {0}")]
    MountInfo(ProcError),
    #[error("could not find mountpoint for {subsystem}")]
    NotFound { subsystem: &'static str },
}

/// Finds where the cgroup v1 devices hierarchy is mounted, usually `/sys/fs/cgroup/devices`.
pub fn get_devices_mount_point() -> Result<PathBuf, MountPointError> {
    let mount_infos = Process::myself()
        .map_err(MountPointError::ReadSelf)?
        .mountinfo()
        .map_err(MountPointError::MountInfo)?;

    find_devices_mount_point(
        mount_infos
            .into_iter()
            .map(|m| (m.fs_type, m.mount_point)),
    )
}

/// Picks the devices hierarchy out of `(filesystem type, mount point)` pairs.
fn find_devices_mount_point<I>(mounts: I) -> Result<PathBuf, MountPointError>
where
    I: IntoIterator<Item = (String, PathBuf)>,
{
    mounts
        .into_iter()
        .find(|(fs_type, mount_point)| fs_type == "cgroup" && is_devices_mount_point(mount_point))
        .map(|(_, mount_point)| mount_point)
        .ok_or(MountPointError::NotFound {
            subsystem: DEVICES_SUBSYSTEM,
        })
}

// Comounted hierarchies are named after all of their subsystems, e.g. "devices,freezer".
fn is_devices_mount_point(mount_point: &Path) -> bool {
    mount_point
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.split(',').any(|s| s == DEVICES_SUBSYSTEM))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount_info(fs_type: &str, mount_point: &str) -> (String, PathBuf) {
        (fs_type.to_owned(), PathBuf::from(mount_point))
    }

    #[test]
    fn test_find_devices_mount_point() {
        let mounts = vec![
            mount_info("tmpfs", "/sys/fs/cgroup"),
            mount_info("cgroup", "/sys/fs/cgroup/memory"),
            mount_info("cgroup", "/sys/fs/cgroup/devices"),
        ];

        let mount_point = find_devices_mount_point(mounts).expect("find devices mount point");
        assert_eq!(mount_point, PathBuf::from("/sys/fs/cgroup/devices"));
    }

    #[test]
    fn test_find_comounted_devices_mount_point() {
        let mounts = vec![mount_info("cgroup", "/sys/fs/cgroup/devices,freezer")];

        let mount_point = find_devices_mount_point(mounts).expect("find devices mount point");
        assert_eq!(mount_point, PathBuf::from("/sys/fs/cgroup/devices,freezer"));
    }

    #[test]
    fn test_devices_mount_point_requires_cgroup_fs() {
        let mounts = vec![
            mount_info("cgroup2", "/sys/fs/cgroup"),
            mount_info("tmpfs", "/run/devices"),
        ];

        let err = find_devices_mount_point(mounts).unwrap_err();
        assert!(matches!(err, MountPointError::NotFound { subsystem: "devices" }));
    }

    #[test]
    fn test_is_devices_mount_point() {
        assert!(is_devices_mount_point(Path::new("/sys/fs/cgroup/devices")));
        assert!(is_devices_mount_point(Path::new("/cgroup/cpu,devices")));
        assert!(!is_devices_mount_point(Path::new("/sys/fs/cgroup/devices_extra")));
        assert!(!is_devices_mount_point(Path::new("/")));
    }
}
