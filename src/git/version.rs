use crate::error::{GitError, Result};
use crate::git::executor::{GitCommand, GitExecutor};
use std::fmt;

/// Minimum required git version
const MIN_GIT_VERSION: (u32, u32) = (2, 20);

/// Represents a git version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Detect the version of the default `git` binary
    pub fn detect() -> Result<Self> {
        Self::detect_with(&GitExecutor::new(std::env::temp_dir()))
    }

    /// Detect the version of the binary an executor is configured with
    ///
    /// `--version` needs no repository, so this runs in the system temp directory.
    pub fn detect_with(executor: &GitExecutor) -> Result<Self> {
        let output = executor
            .execute_in(&std::env::temp_dir(), &GitCommand::new("--version"))
            .map_err(|e| GitError::GitVersionDetectionFailed(e.to_string()))?;

        if !output.success() {
            return Err(GitError::GitVersionDetectionFailed(format!(
                "{} --version exited with code {}",
                executor.binary(),
                output.exit_code
            )));
        }

        Self::parse(&output.text())
    }

    /// Parse git version from string like "git version 2.39.2"
    pub fn parse(version_str: &str) -> Result<Self> {
        // "git version X.Y.Z", possibly followed by a platform suffix
        let parts: Vec<&str> = version_str.split_whitespace().collect();

        if parts.len() < 3 || parts[0] != "git" || parts[1] != "version" {
            return Err(GitError::ParseError(format!(
                "Unexpected git version format: {}",
                version_str.trim()
            )));
        }

        let nums: Vec<&str> = parts[2].split('.').collect();
        if nums.len() < 2 {
            return Err(GitError::ParseError(format!(
                "Invalid version number format: {}",
                parts[2]
            )));
        }

        let major = nums[0]
            .parse::<u32>()
            .map_err(|_| GitError::ParseError(format!("Invalid major version: {}", nums[0])))?;

        let minor = nums[1]
            .parse::<u32>()
            .map_err(|_| GitError::ParseError(format!("Invalid minor version: {}", nums[1])))?;

        // "2.39.2.windows.1", "2.40.0-rc1"
        let patch = nums
            .get(2)
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse::<u32>()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        Ok(GitVersion {
            major,
            minor,
            patch,
        })
    }

    /// Check if this version meets minimum requirements
    pub fn is_supported(&self) -> bool {
        (self.major, self.minor) >= MIN_GIT_VERSION
    }

    /// Detect and require a supported version
    pub fn validate_with(executor: &GitExecutor) -> Result<Self> {
        let version = Self::detect_with(executor)?;

        if !version.is_supported() {
            return Err(GitError::GitVersionTooOld(version.to_string()));
        }

        Ok(version)
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitSettings;

    #[test]
    fn test_parse_standard_version() {
        let version = GitVersion::parse("git version 2.39.2\n").unwrap();
        assert_eq!(version, GitVersion { major: 2, minor: 39, patch: 2 });
    }

    #[test]
    fn test_parse_version_with_suffix() {
        let version = GitVersion::parse("git version 2.39.2.windows.1").unwrap();
        assert_eq!(version.patch, 2);

        let version = GitVersion::parse("git version 2.40.0-rc1").unwrap();
        assert_eq!(version.patch, 0);
        assert_eq!(version.minor, 40);
    }

    #[test]
    fn test_parse_version_no_patch() {
        let version = GitVersion::parse("git version 2.39").unwrap();
        assert_eq!(version.patch, 0);
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(GitVersion::parse("version 2.39.2").is_err());
        assert!(GitVersion::parse("git 2.39.2").is_err());
        assert!(GitVersion::parse("git version two.x").is_err());
    }

    #[test]
    fn test_is_supported() {
        assert!(GitVersion { major: 2, minor: 20, patch: 0 }.is_supported());
        assert!(GitVersion { major: 3, minor: 0, patch: 0 }.is_supported());
        assert!(!GitVersion { major: 2, minor: 19, patch: 9 }.is_supported());
        assert!(!GitVersion { major: 1, minor: 9, patch: 0 }.is_supported());
    }

    #[test]
    fn test_detect_installed_git() {
        let version = GitVersion::detect().unwrap();
        assert!(version.major >= 2);
    }

    #[test]
    fn test_detect_missing_binary() {
        let settings = GitSettings {
            binary: "no-such-git-binary".to_string(),
            ..GitSettings::default()
        };
        let executor = GitExecutor::with_settings(std::env::temp_dir(), &settings);
        assert!(matches!(
            GitVersion::detect_with(&executor),
            Err(GitError::GitVersionDetectionFailed(_))
        ));
    }
}
