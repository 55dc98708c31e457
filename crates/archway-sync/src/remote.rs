//! Remote directory creation and ownership handoff
//!
//! Builds the shell command lines for the ENSURE_TARGET_DIR, PRE_HANDOFF
//! and POST_HANDOFF steps and drives them through a [`RemoteShell`]. The
//! target directory is created segment by segment from the topmost missing
//! ancestor; the `[ -d ... ] ||` guard makes sure only newly created
//! segments receive the configured ownership and permission bits.

use tracing::info;

use archway_core::config::TargetConfig;
use archway_core::domain::SyncError;

use crate::session::RemoteShell;

fn sudo_prefix(target: &TargetConfig) -> &'static str {
    if target.sudo {
        "sudo "
    } else {
        ""
    }
}

/// Command creating one directory segment with the configured ownership,
/// a no-op when the segment already exists.
fn mkdir_segment_command(dir: &str, target: &TargetConfig) -> String {
    let sudo = sudo_prefix(target);
    format!(
        "[ -d {dir} ] || ({sudo}mkdir {dir} && {sudo}chown -R {owner}:{group} {dir} && \
         {sudo}chmod -R {mode} {dir})",
        owner = target.owner,
        group = target.group,
        mode = target.permission,
    )
}

/// Command handing the whole target directory to `user:group`.
pub(crate) fn handoff_command(
    dir: &str,
    user: &str,
    group: &str,
    target: &TargetConfig,
) -> String {
    let sudo = sudo_prefix(target);
    format!(
        "{sudo}chown -R {user}:{group} {dir} && {sudo}chmod -R {mode} {dir}",
        mode = target.permission,
    )
}

/// Expands `/a/b/c/` into `["/a", "/a/b", "/a/b/c"]`.
fn ancestor_chain(dir: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut total = String::new();
    for part in dir.split('/').filter(|p| !p.is_empty()) {
        total.push('/');
        total.push_str(part);
        chain.push(total.clone());
    }
    chain
}

/// ENSURE_TARGET_DIR: probes for the directory and, when absent, creates
/// it segment by segment from the topmost missing ancestor.
pub(crate) fn ensure_target_dir<S: RemoteShell + ?Sized>(
    shell: &mut S,
    dir: &str,
    target: &TargetConfig,
) -> Result<(), SyncError> {
    if !shell.dir_absent(dir)? {
        return Ok(());
    }
    info!(dir, "creating remote target directory");
    for ancestor in ancestor_chain(dir) {
        shell.exec_checked(&mkdir_segment_command(&ancestor, target))?;
    }
    Ok(())
}
