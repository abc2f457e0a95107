//! Compute sessions: explicit, scoped ownership of one compute device.
//!
//! A session holds an exclusive lease on its device for the lifetime of a trial. The
//! lease is a lock file created with create-new semantics, so two trials (in this
//! process or another) can never share a device. Dropping the session releases it.
//! A lease whose recorded process has exited is reclaimed by the next acquirer.

use crate::config::{SessionConfig, project_dirs};
use crate::error::{AutodaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Contents of a device lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLease {
    pub session_id: String,
    pub device: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// An acquired compute session.
#[derive(Debug)]
pub struct ComputeSession {
    lease: DeviceLease,
    lock_path: PathBuf,
    log_device_placement: bool,
    allow_soft_placement: bool,
}

impl ComputeSession {
    /// Acquire the configured device, failing with `DeviceBusy` if it is already leased.
    pub fn acquire(config: &SessionConfig) -> Result<Self> {
        let lock_dir = match &config.lock_dir {
            Some(dir) => dir.clone(),
            None => project_dirs()
                .map(|d| d.data_dir().join("locks"))
                .unwrap_or_else(|| PathBuf::from(".autoda/locks")),
        };
        Self::acquire_in(config, &lock_dir)
    }

    fn acquire_in(config: &SessionConfig, lock_dir: &Path) -> Result<Self> {
        if config.device.trim().is_empty() {
            return Err(AutodaError::precondition("session device must not be empty"));
        }
        std::fs::create_dir_all(lock_dir)?;
        let lock_path = lock_dir.join(format!("{}.lock", sanitize(&config.device)));

        let lease = DeviceLease {
            session_id: uuid::Uuid::new_v4().to_string(),
            device: config.device.clone(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let mut file = open_lock(&lock_path, &config.device)?;
        write_lease(&mut file, &lease, &lock_path)?;

        info!(
            session_id = %lease.session_id,
            device = %lease.device,
            log_device_placement = config.log_device_placement,
            allow_soft_placement = config.allow_soft_placement,
            "Acquired compute session"
        );

        Ok(Self {
            lease,
            lock_path,
            log_device_placement: config.log_device_placement,
            allow_soft_placement: config.allow_soft_placement,
        })
    }

    pub fn id(&self) -> &str {
        &self.lease.session_id
    }

    pub fn device(&self) -> &str {
        &self.lease.device
    }

    pub fn lease(&self) -> &DeviceLease {
        &self.lease
    }

    pub fn log_device_placement(&self) -> bool {
        self.log_device_placement
    }

    pub fn allow_soft_placement(&self) -> bool {
        self.allow_soft_placement
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ComputeSession {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => debug!(session_id = %self.lease.session_id, "Released compute session"),
            Err(e) => warn!(
                session_id = %self.lease.session_id,
                path = %self.lock_path.display(),
                "Failed to release device lease: {e}"
            ),
        }
    }
}

/// Create the lock file, reclaiming it once if its holder has exited.
fn open_lock(lock_path: &Path, device: &str) -> Result<File> {
    let mut reclaimed = false;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(lock_path) {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(lock_path).unwrap_or_default();
                if !reclaimed && reclaim_stale(lock_path, &holder) {
                    reclaimed = true;
                    continue;
                }
                return Err(AutodaError::DeviceBusy(format!("{} is leased ({})", device, holder.trim())));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Remove a lock file whose lease names a process that no longer runs.
fn reclaim_stale(lock_path: &Path, holder: &str) -> bool {
    let Ok(lease) = serde_json::from_str::<DeviceLease>(holder) else {
        return false;
    };
    if process_alive(lease.pid) {
        return false;
    }
    warn!(
        session_id = %lease.session_id,
        device = %lease.device,
        pid = lease.pid,
        "Reclaiming device lease left by an exited process"
    );
    match std::fs::remove_file(lock_path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %lock_path.display(), "Failed to remove stale device lease: {e}");
            false
        }
    }
}

/// Write the lease into a freshly created lock file; the file is removed if that fails.
fn write_lease<W: Write>(file: &mut W, lease: &DeviceLease, lock_path: &Path) -> Result<()> {
    let written = serde_json::to_string(lease)
        .map_err(AutodaError::from)
        .and_then(|json| Ok(file.write_all(json.as_bytes())?));
    if written.is_err() {
        let _ = std::fs::remove_file(lock_path);
    }
    written
}

fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return true;
        };
        if pid <= 0 {
            return true;
        }
        // SAFETY: signal 0 only checks that the pid exists and may be signalled.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

fn sanitize(device: &str) -> String {
    device
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
