//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Shared primitives for the launcher workspace."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---

/// Build metadata captured at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub semver: String,
    pub git_sha: String,
    pub build_timestamp: String,
    pub profile: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            git_sha: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown").to_owned(),
            build_timestamp: option_env!("VERGEN_BUILD_TIMESTAMP")
                .unwrap_or("unknown")
                .to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Short form used in banners, e.g. `0.1.0 (abc1234)`.
    pub fn cli_string(&self) -> String {
        let sha: String = self.git_sha.chars().take(7).collect();
        format!("{} ({})", self.semver, sha)
    }

    pub fn extended(&self) -> String {
        format!(
            "dexfleet {}\ncommit: {}\nbuilt: {}\nprofile: {}",
            self.semver, self.git_sha, self.build_timestamp, self.profile
        )
    }
}
