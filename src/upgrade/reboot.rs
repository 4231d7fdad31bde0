//! Reboot-deferred replacement.
//!
//! When the executable cannot be replaced directly, Windows can be asked to
//! perform the rename itself early in the next boot, before any user process
//! starts (`MoveFileExW` with `MOVEFILE_DELAY_UNTIL_REBOOT`). Other platforms
//! have no equivalent facility and report [`InstallError::RebootUnsupported`].

use crate::core::InstallError;
use crate::markers::MarkerStore;
use std::path::Path;
use tracing::info;

/// Registers a replacement to run at next boot.
pub trait RebootScheduler: Send + Sync {
    /// Arrange for `source` to be moved over `target` at next boot.
    fn schedule(&self, source: &Path, target: &Path) -> Result<(), InstallError>;
}

/// The OS facility of the running platform.
#[derive(Debug, Default)]
pub struct PlatformReboot;

impl RebootScheduler for PlatformReboot {
    #[cfg(windows)]
    fn schedule(&self, source: &Path, target: &Path) -> Result<(), InstallError> {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MOVEFILE_DELAY_UNTIL_REBOOT, MOVEFILE_REPLACE_EXISTING, MoveFileExW,
        };

        let wide = |p: &Path| -> Vec<u16> {
            p.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
        };
        let source_w = wide(source);
        let target_w = wide(target);

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call.
        let ok = unsafe {
            MoveFileExW(
                source_w.as_ptr(),
                target_w.as_ptr(),
                MOVEFILE_DELAY_UNTIL_REBOOT | MOVEFILE_REPLACE_EXISTING,
            )
        };
        if ok == 0 {
            return Err(InstallError::RebootScheduleFailed(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn schedule(&self, _source: &Path, _target: &Path) -> Result<(), InstallError> {
        Err(InstallError::RebootUnsupported)
    }
}

/// Schedule `package` to replace `install_path` at next boot and record the
/// pending state for the next startup.
pub fn schedule_pending(
    scheduler: &dyn RebootScheduler,
    markers: &MarkerStore,
    package: &Path,
    install_path: &Path,
) -> Result<(), InstallError> {
    if !package.is_file() {
        return Err(InstallError::Plan(format!(
            "package {} no longer exists",
            package.display()
        )));
    }

    scheduler.schedule(package, install_path)?;
    info!(
        package = %package.display(),
        target = %install_path.display(),
        "Replacement scheduled for next reboot"
    );

    markers
        .write_pending(package)
        .map_err(|e| InstallError::Io(std::io::Error::other(e)))
}
