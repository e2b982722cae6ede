//! Build information embedded by build.rs

use std::fmt;

/// Compile-time facts about this binary
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short git revision, or "unknown" outside a checkout
    pub revision: &'static str,
    dirty: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            revision: env!("CNC_GIT_REVISION"),
            dirty: env!("CNC_GIT_DIRTY"),
            built_at: env!("CNC_BUILD_TIMESTAMP"),
            target: env!("CNC_TARGET"),
            profile: env!("CNC_PROFILE"),
            rustc: env!("CNC_RUSTC_VERSION"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty == "true"
    }

    /// Version plus revision, e.g. "0.1.0+abc12345"
    pub fn full_version(&self) -> String {
        let suffix = if self.is_dirty() { ".dirty" } else { "" };
        format!("{}+{}{}", self.version, self.revision, suffix)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f, "  built:   {} ({})", self.built_at, self.profile)?;
        writeln!(f, "  target:  {}", self.target)?;
        writeln!(f, "  rustc:   {}", self.rustc)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", build_info());
}
