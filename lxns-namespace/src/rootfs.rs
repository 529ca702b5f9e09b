//! Filesystem setup inside the new mount namespace
//!
//! With a configured root filesystem the child re-roots itself:
//!
//! ```text
//! mount --rbind /dev   $ROOTFS/dev
//! mount --rbind /proc  $ROOTFS/proc
//! mount --rbind /sys   $ROOTFS/sys
//! mount --rbind $ROOTFS $ROOTFS
//! mkdir -p $ROOTFS/.pivot_root
//! pivot_root $ROOTFS $ROOTFS/.pivot_root
//! cd /
//! umount -l /.pivot_root
//! rmdir /.pivot_root
//! ```
//!
//! Every primitive goes through a [`Mounter`], so the sequence can be
//! checked without privileges using [`RecordingMounter`].

use std::path::{Path, PathBuf};

use lxns_core::{Error, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use nix::sys::stat::Mode;
use tracing::{debug, info};

use crate::config::{Feature, FeatureSet};

/// Staging directory for the old root, relative to the new root
pub const PIVOT_DIR: &str = ".pivot_root";

/// Host trees bound into the new root before pivoting
pub const HOST_BINDS: [&str; 3] = ["/dev", "/proc", "/sys"];

/// Mount primitives used by the setup stage
pub trait Mounter {
    /// Make every mount below `path` private, recursively
    fn make_private(&mut self, path: &Path) -> nix::Result<()>;

    /// Mount a fresh `proc` at `target` with `nosuid,nodev,noexec`
    fn mount_proc(&mut self, target: &Path) -> nix::Result<()>;

    /// Recursive bind mount
    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()>;

    /// Create a directory unless it already exists
    fn ensure_dir(&mut self, path: &Path) -> nix::Result<()>;

    /// pivot_root(2)
    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> nix::Result<()>;

    /// chdir(2)
    fn chdir(&mut self, path: &Path) -> nix::Result<()>;

    /// Lazy unmount (`MNT_DETACH`)
    fn detach(&mut self, target: &Path) -> nix::Result<()>;

    /// Remove an empty directory
    fn remove_dir(&mut self, path: &Path) -> nix::Result<()>;
}

/// Performs the real syscalls
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMounter;

impl Mounter for SystemMounter {
    fn make_private(&mut self, path: &Path) -> nix::Result<()> {
        nix::mount::mount(
            None::<&str>,
            path,
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
    }

    fn mount_proc(&mut self, target: &Path) -> nix::Result<()> {
        nix::mount::mount(
            Some("proc"),
            target,
            Some("proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            None::<&str>,
        )
    }

    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()> {
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
    }

    fn ensure_dir(&mut self, path: &Path) -> nix::Result<()> {
        match nix::unistd::mkdir(path, Mode::from_bits_truncate(0o700)) {
            Ok(()) | Err(Errno::EEXIST) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> nix::Result<()> {
        nix::unistd::pivot_root(new_root, put_old)
    }

    fn chdir(&mut self, path: &Path) -> nix::Result<()> {
        nix::unistd::chdir(path)
    }

    fn detach(&mut self, target: &Path) -> nix::Result<()> {
        nix::mount::umount2(target, MntFlags::MNT_DETACH)
    }

    fn remove_dir(&mut self, path: &Path) -> nix::Result<()> {
        std::fs::remove_dir(path).map_err(|e| e.raw_os_error().map_or(Errno::EIO, Errno::from_raw))
    }
}

/// One recorded mount primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOp {
    /// [`Mounter::make_private`]
    MakePrivate(PathBuf),
    /// [`Mounter::mount_proc`]
    MountProc(PathBuf),
    /// [`Mounter::bind`]
    Bind {
        /// Source tree
        source: PathBuf,
        /// Mount point
        target: PathBuf,
    },
    /// [`Mounter::ensure_dir`]
    EnsureDir(PathBuf),
    /// [`Mounter::pivot_root`]
    PivotRoot {
        /// New root
        new_root: PathBuf,
        /// Where the old root goes
        put_old: PathBuf,
    },
    /// [`Mounter::chdir`]
    Chdir(PathBuf),
    /// [`Mounter::detach`]
    Detach(PathBuf),
    /// [`Mounter::remove_dir`]
    RemoveDir(PathBuf),
}

impl MountOp {
    /// Check if this is a mount or bind mount
    #[must_use]
    pub const fn is_mount(&self) -> bool {
        matches!(self, Self::MountProc(_) | Self::Bind { .. })
    }
}

/// Records operations instead of performing them
#[derive(Debug, Default)]
pub struct RecordingMounter {
    ops: Vec<MountOp>,
    fail_on: Option<MountOp>,
}

impl RecordingMounter {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `EPERM` when `op` is attempted
    #[must_use]
    pub fn failing_on(op: MountOp) -> Self {
        Self {
            ops: Vec::new(),
            fail_on: Some(op),
        }
    }

    /// Operations attempted so far, in order
    #[must_use]
    pub fn ops(&self) -> &[MountOp] {
        &self.ops
    }

    fn record(&mut self, op: MountOp) -> nix::Result<()> {
        let fail = self.fail_on.as_ref() == Some(&op);
        self.ops.push(op);
        if fail { Err(Errno::EPERM) } else { Ok(()) }
    }
}

impl Mounter for RecordingMounter {
    fn make_private(&mut self, path: &Path) -> nix::Result<()> {
        self.record(MountOp::MakePrivate(path.to_path_buf()))
    }

    fn mount_proc(&mut self, target: &Path) -> nix::Result<()> {
        self.record(MountOp::MountProc(target.to_path_buf()))
    }

    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()> {
        self.record(MountOp::Bind {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        })
    }

    fn ensure_dir(&mut self, path: &Path) -> nix::Result<()> {
        self.record(MountOp::EnsureDir(path.to_path_buf()))
    }

    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> nix::Result<()> {
        self.record(MountOp::PivotRoot {
            new_root: new_root.to_path_buf(),
            put_old: put_old.to_path_buf(),
        })
    }

    fn chdir(&mut self, path: &Path) -> nix::Result<()> {
        self.record(MountOp::Chdir(path.to_path_buf()))
    }

    fn detach(&mut self, target: &Path) -> nix::Result<()> {
        self.record(MountOp::Detach(target.to_path_buf()))
    }

    fn remove_dir(&mut self, path: &Path) -> nix::Result<()> {
        self.record(MountOp::RemoveDir(path.to_path_buf()))
    }
}

fn mount_error(target: &Path, e: Errno) -> Error {
    Error::Mount {
        target: target.to_path_buf(),
        message: e.to_string(),
    }
}

fn pivot_error(step: &str, path: &Path, e: Errno) -> Error {
    Error::Pivot {
        message: format!("{step} {}: {e}", path.display()),
    }
}

/// Replace the root filesystem with `rootfs`
///
/// The host's `/dev`, `/proc` and `/sys` are bound in first so the new root
/// is usable on its own; the old root is detached and its mount point
/// removed, so nothing of the host tree stays reachable.
///
/// # Errors
/// Returns [`Error::Mount`] for the bind and staging steps and
/// [`Error::Pivot`] from the pivot onwards; the first failure aborts
pub fn pivot_into<M: Mounter>(mounter: &mut M, rootfs: &Path) -> Result<()> {
    for host in HOST_BINDS {
        let target = rootfs.join(host.trim_start_matches('/'));
        mounter
            .bind(Path::new(host), &target)
            .map_err(|e| mount_error(&target, e))?;
        debug!(source = host, target = %target.display(), "Bound host tree");
    }

    // pivot_root needs the new root to be a mount point of its own
    mounter
        .bind(rootfs, rootfs)
        .map_err(|e| mount_error(rootfs, e))?;

    let put_old = rootfs.join(PIVOT_DIR);
    mounter
        .ensure_dir(&put_old)
        .map_err(|e| mount_error(&put_old, e))?;

    mounter
        .pivot_root(rootfs, &put_old)
        .map_err(|e| pivot_error("pivot_root to", rootfs, e))?;

    let root = Path::new("/");
    mounter
        .chdir(root)
        .map_err(|e| pivot_error("chdir to", root, e))?;

    let old_root = root.join(PIVOT_DIR);
    mounter
        .detach(&old_root)
        .map_err(|e| pivot_error("detaching", &old_root, e))?;
    mounter
        .remove_dir(&old_root)
        .map_err(|e| pivot_error("removing", &old_root, e))?;

    info!(rootfs = %rootfs.display(), "Root filesystem pivoted");
    Ok(())
}

/// Filesystem work the setup stage performs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemPlan {
    mount_proc: bool,
    rootfs: Option<PathBuf>,
}

impl FilesystemPlan {
    /// Derive the plan from the requested features and root filesystem
    ///
    /// Nothing is touched without a mount namespace; mounting there would
    /// change the host.
    #[must_use]
    pub fn new(features: &FeatureSet, rootfs: Option<&Path>) -> Self {
        if !features.contains(Feature::Mount) {
            return Self::default();
        }

        Self {
            mount_proc: features.contains(Feature::Pid),
            rootfs: rootfs
                .filter(|path| !path.as_os_str().is_empty())
                .map(Path::to_path_buf),
        }
    }

    /// Check if the plan performs no operation at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.mount_proc && self.rootfs.is_none()
    }

    /// Root filesystem to pivot into, if any
    #[must_use]
    pub fn rootfs(&self) -> Option<&Path> {
        self.rootfs.as_deref()
    }

    /// Execute the plan
    ///
    /// # Errors
    /// Returns the first [`Error::Mount`] or [`Error::Pivot`]
    pub fn apply<M: Mounter>(&self, mounter: &mut M) -> Result<()> {
        if self.is_empty() {
            debug!("No filesystem setup required");
            return Ok(());
        }

        let root = Path::new("/");
        mounter
            .make_private(root)
            .map_err(|e| mount_error(root, e))?;

        if self.mount_proc {
            let proc = Path::new("/proc");
            mounter.mount_proc(proc).map_err(|e| mount_error(proc, e))?;
            debug!("Mounted fresh /proc");
        }

        if let Some(rootfs) = &self.rootfs {
            pivot_into(mounter, rootfs)?;
        }

        Ok(())
    }
}
