//! Mount configuration
//! -------------------
//!
//! Assembles the platform-specific option string and runs the blocking
//! session loop. The loop runs in the foreground on the calling thread
//! and dispatches one filesystem call at a time; everything in
//! [`crate::fuse`] relies on that single-threaded discipline.

use std::path::Path;

use fuser::MountOption;

use crate::backend::Backend;
use crate::error::Result;
use crate::fuse::Gateway;

/// Maximum transfer and read-ahead size negotiated with the kernel,
/// and the value of the `max_read`/`iosize` mount options.
pub const MAX_READ: u32 = 1 << 20;

const FSNAME: &str = "data-gateway";

/// Builds the `-o` option list. The base is the kernel cache directive;
/// Linux caps the transfer size, macOS additionally suppresses
/// permission checks and AppleDouble/xattr traffic and names the volume
/// after the mount path's final component.
fn mount_options(mountpoint: &Path, debug: bool) -> Vec<MountOption> {
    let mut opts = String::from("auto_cache");

    #[cfg(target_os = "linux")]
    {
        opts.push_str(&format!(",max_read={MAX_READ}"));
    }
    #[cfg(target_os = "macos")]
    {
        let volname = mountpoint
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(FSNAME);
        opts.push_str(&format!(
            ",defer_permissions,noapplexattr,noappledouble,iosize={MAX_READ},volname={volname}"
        ));
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = mountpoint;
    }

    if debug {
        opts.push_str(",debug");
    }

    vec![
        MountOption::FSName(FSNAME.to_string()),
        MountOption::CUSTOM(opts),
    ]
}

/// Mounts `gateway` at `mountpoint` and blocks until unmount or failure.
///
/// A restrictive creation mask is set before the loop starts even though
/// no write path exists.
pub fn mount<B: Backend>(gateway: Gateway<B>, mountpoint: &Path, debug: bool) -> Result<()> {
    let options = mount_options(mountpoint, debug);
    log::info!("Mounting data gateway at {}", mountpoint.display());

    unsafe { libc::umask(0o222) };
    fuser::mount2(gateway, mountpoint, &options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_option(options: &[MountOption]) -> &str {
        options
            .iter()
            .find_map(|opt| match opt {
                MountOption::CUSTOM(s) => Some(s.as_str()),
                _ => None,
            })
            .expect("option string missing")
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_option_string() {
        let options = mount_options(Path::new("/mnt/projects"), false);
        assert_eq!(custom_option(&options), "auto_cache,max_read=1048576");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_debug_flag_appended_last() {
        let options = mount_options(Path::new("/mnt/projects"), true);
        assert_eq!(custom_option(&options), "auto_cache,max_read=1048576,debug");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_macos_option_string_names_volume() {
        let options = mount_options(Path::new("/Users/me/Projects"), false);
        assert_eq!(
            custom_option(&options),
            "auto_cache,defer_permissions,noapplexattr,noappledouble,iosize=1048576,volname=Projects"
        );
    }

    #[test]
    fn test_fsname_present() {
        let options = mount_options(Path::new("/mnt/projects"), false);
        assert!(options.contains(&MountOption::FSName(FSNAME.to_string())));
    }
}
