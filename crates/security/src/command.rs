//! Destructive shell command deny-list.
//!
//! Matching is a case-insensitive substring test. It is a tripwire for
//! obviously catastrophic commands, not a shell parser.

/// Patterns that are never executed.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs.",
    "dd if=",
    ":(){ :|:& };:",
    "> /dev/sd",
    "> /dev/nvme",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    "chmod -r 777 /",
    "chown -r",
];

/// Return the first dangerous pattern `command` matches, if any.
pub fn find_dangerous_pattern(command: &str) -> Option<&'static str> {
    let lowered = command.to_lowercase();
    DANGEROUS_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lowered.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_root_deletion() {
        assert_eq!(find_dangerous_pattern("rm -rf /"), Some("rm -rf /"));
        assert_eq!(find_dangerous_pattern("sudo rm -rf /*"), Some("rm -rf /"));
    }

    #[test]
    fn blocks_disk_wipes_and_fork_bombs() {
        assert!(find_dangerous_pattern("mkfs.ext4 /dev/sda1").is_some());
        assert!(find_dangerous_pattern("dd if=/dev/zero of=/dev/sda").is_some());
        assert!(find_dangerous_pattern(":(){ :|:& };:").is_some());
        assert!(find_dangerous_pattern("echo x > /dev/nvme0n1").is_some());
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(find_dangerous_pattern("SHUTDOWN -h now").is_some());
        assert!(find_dangerous_pattern("Chmod -R 777 /").is_some());
        assert!(find_dangerous_pattern("CHOWN -R nobody /srv").is_some());
    }

    #[test]
    fn ordinary_commands_pass() {
        assert_eq!(find_dangerous_pattern("ls -la"), None);
        assert_eq!(find_dangerous_pattern("cargo test --workspace"), None);
        assert_eq!(find_dangerous_pattern("rm -rf ./target"), None);
    }
}
