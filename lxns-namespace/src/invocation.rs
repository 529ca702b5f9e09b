//! Process role selection
//!
//! The same binary runs twice: once as the launcher and once, re-executed
//! inside the new namespaces, as the setup stage. The launcher marks the
//! second run by passing [`INSTANCE_SENTINEL`] as argv[0].

use std::ffi::{OsStr, OsString};

/// argv[0] of the re-executed setup stage
///
/// Contains characters no sane caller puts in a program path.
pub const INSTANCE_SENTINEL: &str = "@lxns:ns-instance@";

/// Environment variable carrying the instance id into the setup stage
pub const INSTANCE_ID_ENV: &str = "LXNS_ID";

/// Which half of the launcher this process is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Normal command-line invocation; holds the full argv
    Launch(Vec<OsString>),
    /// Re-executed inside the namespaces
    Setup {
        /// Target program and its arguments
        target: Vec<OsString>,
    },
}

impl Invocation {
    /// Classify the current process from its argv
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_args(std::env::args_os())
    }

    /// Classify an argv
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        match args.split_first() {
            Some((argv0, target)) if argv0.as_os_str() == OsStr::new(INSTANCE_SENTINEL) => {
                Self::Setup {
                    target: target.to_vec(),
                }
            }
            _ => Self::Launch(args),
        }
    }

    /// Check if this is the setup stage
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(self, Self::Setup { .. })
    }
}
