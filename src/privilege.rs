/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Realtime scheduling and privilege drop, matching `common.c`'s
//! `set_realtime_prio`/`drop_privs_if_needed`: best-effort for the
//! former (warn and continue), fatal for the latter if a `setuid`/
//! `setgid` call itself fails.

use std::ffi::CString;

use thread_priority::{RealtimeThreadSchedulePolicy, ThreadPriority, ThreadSchedulePolicy};
use tracing::warn;

use crate::error::PrivilegeError;

/// Attempts to raise the current thread to `SCHED_FIFO` priority 80.
/// Unsupported platforms or missing `CAP_SYS_NICE` only produce a
/// warning, matching the reference's non-fatal behaviour.
pub fn set_realtime_priority() {
    let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo);
    if let Err(e) = thread_priority::set_thread_priority_and_policy(
        thread_priority::thread_native_id(),
        ThreadPriority::Crossplatform(80u8.try_into().unwrap_or_default()),
        policy,
    ) {
        warn!(error = ?e, "failed to set realtime scheduling priority, continuing without it");
    }
}

/// Drops root privileges to the `nobody` account. Looking up the user
/// and the `setgid`/`setuid` calls themselves are fatal on failure; if
/// the process is not running as root this is a no-op, matching
/// `drop_privs_if_needed`.
pub fn drop_privileges_if_root() -> Result<(), PrivilegeError> {
    // SAFETY: libc::getuid takes no arguments and has no preconditions.
    if unsafe { libc::getuid() } != 0 {
        return Ok(());
    }

    let name = CString::new("nobody").expect("static string has no NUL bytes");
    // SAFETY: `name` is a valid NUL-terminated C string for the duration of the call.
    let pwd = unsafe { libc::getpwnam(name.as_ptr()) };
    if pwd.is_null() {
        return Err(PrivilegeError::NoSuchUser);
    }
    // SAFETY: pwd is non-null and was just returned by a successful getpwnam call.
    let (uid, gid) = unsafe { ((*pwd).pw_uid, (*pwd).pw_gid) };

    // SAFETY: gid is a valid value obtained from getpwnam above.
    if unsafe { libc::setgid(gid) } != 0 {
        return Err(PrivilegeError::SetGid(std::io::Error::last_os_error()));
    }
    // SAFETY: uid is a valid value obtained from getpwnam above.
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(PrivilegeError::SetUid(std::io::Error::last_os_error()));
    }
    Ok(())
}
