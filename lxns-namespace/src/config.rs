//! Namespace configuration
//!
//! [`NamespaceConfig`] is the contract shared by both stages of the launcher.
//! The parent builds it (defaults, then an optional JSON file, then command
//! line overrides), sends it over the control channel, and the child reads
//! it back. Field names on the wire are PascalCase.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use lxns_core::{Error, InstanceId, Result};
use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// Longest hostname accepted by sethostname(2)
pub const HOST_NAME_MAX: usize = 64;

/// A kind of namespace that can be requested in `Features`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// IPC namespace (`ipc`)
    Ipc,
    /// Network namespace (`net`)
    Net,
    /// Mount namespace (`ns`)
    Mount,
    /// PID namespace (`pid`)
    Pid,
    /// User namespace (`user`)
    User,
    /// UTS namespace (`uts`)
    Uts,
}

impl Feature {
    /// Every recognised feature
    pub const ALL: [Self; 6] = [
        Self::Ipc,
        Self::Net,
        Self::Mount,
        Self::Pid,
        Self::User,
        Self::Uts,
    ];

    /// Token used in the configuration
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Net => "net",
            Self::Mount => "ns",
            Self::Pid => "pid",
            Self::User => "user",
            Self::Uts => "uts",
        }
    }

    /// Clone flag that creates this namespace
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::User => CloneFlags::CLONE_NEWUSER,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
        }
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.token() == s)
            .ok_or_else(|| Error::UnrecognizedFeature {
                feature: s.to_string(),
            })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Deduplicated set of requested features
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(BTreeSet<Feature>);

impl FeatureSet {
    /// Parse feature tokens, failing on the first unrecognised one
    ///
    /// # Errors
    /// Returns [`Error::UnrecognizedFeature`] naming the offending token
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        tokens
            .iter()
            .map(|token| token.as_ref().parse())
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    /// Check if a feature was requested
    #[must_use]
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    /// Iterate over the requested features
    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.iter().copied()
    }

    /// Check if nothing was requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// OR of the clone flags of every feature
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        self.iter().map(Feature::clone_flag).collect()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One contiguous block of a user-namespace ID translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdMapping {
    /// First ID inside the namespace
    pub container_id: u32,
    /// First ID outside the namespace
    pub host_id: u32,
    /// Number of IDs in the block
    pub size: u32,
}

impl IdMapping {
    /// Map root inside the namespace to a single host ID
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            size: 1,
        }
    }

    fn container_range(&self) -> (u64, u64) {
        let start = u64::from(self.container_id);
        (start, start + u64::from(self.size))
    }

    fn host_range(&self) -> (u64, u64) {
        let start = u64::from(self.host_id);
        (start, start + u64::from(self.size))
    }
}

/// ID-mapping table in the shape the kernel expects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapTable {
    entries: Vec<IdMapping>,
}

impl IdMapTable {
    /// Build a table from configured mappings
    #[must_use]
    pub fn new(mappings: &[IdMapping]) -> Self {
        Self {
            entries: mappings.to_vec(),
        }
    }

    /// Entries in configuration order
    #[must_use]
    pub fn entries(&self) -> &[IdMapping] {
        &self.entries
    }

    /// Check if the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as the contents of `/proc/<pid>/uid_map` or `gid_map`
    #[must_use]
    pub fn to_proc_format(&self) -> String {
        self.entries
            .iter()
            .map(|m| format!("{} {} {}\n", m.container_id, m.host_id, m.size))
            .collect()
    }
}

/// Additional mount declaration
///
/// Carried on the wire but not acted upon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Mount {
    /// Source device or path
    pub device: String,
    /// Mount point inside the new root
    pub target: String,
    /// Filesystem type
    #[serde(rename = "Type")]
    pub fs_type: String,
    /// Mount flags
    pub flags: Vec<String>,
    /// Filesystem options
    pub options: String,
}

/// Declared target executable
///
/// Informational: the program actually run is taken from the arguments of
/// the spawned process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Exec {
    /// Program path
    pub path: String,
    /// Program arguments
    pub args: Vec<String>,
}

/// Configuration of one namespace instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NamespaceConfig {
    /// Instance identifier
    pub id: InstanceId,

    /// Requested namespace kinds, as written in the configuration
    pub features: Vec<String>,

    /// UID translation for the user namespace
    pub uid_mappings: Vec<IdMapping>,

    /// GID translation for the user namespace
    pub gid_mappings: Vec<IdMapping>,

    /// New root filesystem; empty disables re-rooting
    #[serde(rename = "RootFS")]
    pub rootfs: PathBuf,

    /// Additional mounts
    pub mounts: Vec<Mount>,

    /// IPv4 address in CIDR form for the namespace interface; empty means
    /// loopback only
    pub network_addr: String,

    /// Declared target executable
    pub exec: Exec,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            id: InstanceId::default(),
            features: Feature::ALL.iter().map(|f| f.token().to_string()).collect(),
            uid_mappings: vec![IdMapping::root_to(nix::unistd::getuid().as_raw())],
            gid_mappings: vec![IdMapping::root_to(nix::unistd::getgid().as_raw())],
            rootfs: PathBuf::new(),
            mounts: Vec::new(),
            network_addr: String::new(),
            exec: Exec::default(),
        }
    }
}

/// Values given on the command line, applied on top of the loaded config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `Id`
    pub id: Option<String>,
    /// Replaces `RootFS`
    pub rootfs: Option<PathBuf>,
    /// Replaces `NetworkAddr`
    pub network_addr: Option<String>,
}

impl NamespaceConfig {
    /// Create a configuration with the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the defaults, overlaid with a JSON file when one is given
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the file cannot be opened or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("No configuration file, using defaults");
            return Ok(Self::default());
        };

        tracing::debug!(path = %path.display(), "Loading configuration");

        let file = File::open(path)
            .map_err(|e| Error::config(format!("failed to open {}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    /// Overlay a JSON definition on the defaults
    ///
    /// Fields absent from the input keep their default value.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the input is not a valid definition
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| Error::config(format!("failed to load configuration: {e}")))
    }

    /// Parse a JSON definition
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the input is not a valid definition
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_reader(json.as_bytes())
    }

    /// Encode as JSON
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if encoding fails
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::config(format!("failed to encode configuration: {e}")))
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(id) = overrides.id {
            self.id = InstanceId::new(id);
        }
        if let Some(rootfs) = overrides.rootfs {
            self.rootfs = rootfs;
        }
        if let Some(addr) = overrides.network_addr {
            self.network_addr = addr;
        }
    }

    /// Fill in defaults that depend on other fields, then validate
    ///
    /// With the `user` feature, an empty mapping table falls back to mapping
    /// root to the invoking user or group.
    ///
    /// # Errors
    /// Returns an error if the resulting configuration is invalid
    pub fn resolve(mut self) -> Result<Self> {
        if self.features()?.contains(Feature::User) {
            if self.uid_mappings.is_empty() {
                self.uid_mappings = vec![IdMapping::root_to(nix::unistd::getuid().as_raw())];
            }
            if self.gid_mappings.is_empty() {
                self.gid_mappings = vec![IdMapping::root_to(nix::unistd::getgid().as_raw())];
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Check the configuration before anything is spawned
    ///
    /// # Errors
    /// Returns [`Error::UnrecognizedFeature`] or [`Error::InvalidConfig`]
    pub fn validate(&self) -> Result<()> {
        let features = self.features()?;

        if features.contains(Feature::User) {
            if self.uid_mappings.is_empty() || self.gid_mappings.is_empty() {
                return Err(Error::config("user namespace requires UID and GID mappings"));
            }
            check_mappings("UidMappings", &self.uid_mappings)?;
            check_mappings("GidMappings", &self.gid_mappings)?;
        }

        if self.has_rootfs() {
            if self.rootfs.to_str().is_none() {
                return Err(Error::config(format!(
                    "RootFS must be valid UTF-8, got {}",
                    self.rootfs.display()
                )));
            }
            if !self.rootfs.is_absolute() {
                return Err(Error::config(format!(
                    "RootFS must be an absolute path, got {}",
                    self.rootfs.display()
                )));
            }
        }

        let hostname = self.id.hostname();
        if hostname.len() > HOST_NAME_MAX {
            return Err(Error::config(format!(
                "Id `{}` is too long: hostname {hostname} exceeds {HOST_NAME_MAX} bytes",
                self.id
            )));
        }

        self.network_address()?;

        if !self.mounts.is_empty() {
            tracing::warn!(
                count = self.mounts.len(),
                "Mounts are declared but not applied"
            );
        }

        Ok(())
    }

    /// Typed set of requested features
    ///
    /// # Errors
    /// Returns [`Error::UnrecognizedFeature`] naming the first unknown token
    pub fn features(&self) -> Result<FeatureSet> {
        FeatureSet::parse(&self.features)
    }

    /// Convert to clone flags for clone(2)
    ///
    /// # Errors
    /// Returns [`Error::UnrecognizedFeature`] naming the first unknown token
    pub fn clone_flags(&self) -> Result<CloneFlags> {
        self.features().map(|features| features.clone_flags())
    }

    /// UID table to write to `/proc/<pid>/uid_map`
    #[must_use]
    pub fn uid_map_table(&self) -> IdMapTable {
        IdMapTable::new(&self.uid_mappings)
    }

    /// GID table to write to `/proc/<pid>/gid_map`
    #[must_use]
    pub fn gid_map_table(&self) -> IdMapTable {
        IdMapTable::new(&self.gid_mappings)
    }

    /// Check if a new root filesystem is configured
    #[must_use]
    pub fn has_rootfs(&self) -> bool {
        !self.rootfs.as_os_str().is_empty()
    }

    /// Parsed `NetworkAddr`, `None` when empty
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the address is not IPv4 CIDR
    pub fn network_address(&self) -> Result<Option<Ipv4Network>> {
        if self.network_addr.is_empty() {
            return Ok(None);
        }

        self.network_addr
            .parse::<Ipv4Network>()
            .map(Some)
            .map_err(|e| {
                Error::config(format!(
                    "NetworkAddr `{}` is not an IPv4 CIDR address: {e}",
                    self.network_addr
                ))
            })
    }
}

fn check_mappings(kind: &str, mappings: &[IdMapping]) -> Result<()> {
    for (i, mapping) in mappings.iter().enumerate() {
        if mapping.size == 0 {
            return Err(Error::config(format!("{kind}[{i}] has size 0")));
        }

        for (j, other) in mappings.iter().enumerate().skip(i + 1) {
            if overlaps(mapping.container_range(), other.container_range())
                || overlaps(mapping.host_range(), other.host_range())
            {
                return Err(Error::config(format!("{kind}[{i}] and {kind}[{j}] overlap")));
            }
        }
    }
    Ok(())
}

const fn overlaps(a: (u64, u64), b: (u64, u64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_features(tokens: &[&str]) -> NamespaceConfig {
        NamespaceConfig {
            features: tokens.iter().map(ToString::to_string).collect(),
            ..NamespaceConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = NamespaceConfig::default();
        assert_eq!(config.id.as_str(), "0123456789");
        assert_eq!(config.features, ["ipc", "net", "ns", "pid", "user", "uts"]);
        assert_eq!(config.uid_mappings.len(), 1);
        assert_eq!(config.gid_mappings.len(), 1);
        assert!(!config.has_rootfs());
        assert!(config.network_address().unwrap().is_none());
    }

    #[test]
    fn test_feature_tokens() {
        for feature in Feature::ALL {
            assert_eq!(feature.token().parse::<Feature>().unwrap(), feature);
        }
        assert_eq!(Feature::Mount.to_string(), "ns");
    }

    #[test]
    fn test_clone_flags_conversion() {
        let flags = with_features(&["pid", "net"]).clone_flags().unwrap();

        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNS));
    }

    #[test]
    fn test_clone_flags_all_features() {
        let flags = NamespaceConfig::default().clone_flags().unwrap();
        let expected = CloneFlags::CLONE_NEWIPC
            | CloneFlags::CLONE_NEWNET
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWUTS;
        assert_eq!(flags, expected);
    }

    #[test]
    fn test_clone_flags_idempotent_under_duplicates() {
        let once = with_features(&["uts", "ipc"]).clone_flags().unwrap();
        let twice = with_features(&["uts", "ipc", "uts", "ipc", "uts"])
            .clone_flags()
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clone_flags_empty_features() {
        assert!(with_features(&[]).clone_flags().unwrap().is_empty());
    }

    #[test]
    fn test_unrecognised_feature_is_named() {
        let err = with_features(&["uts", "cgroup", "pid"])
            .clone_flags()
            .unwrap_err();
        match err {
            Error::UnrecognizedFeature { feature } => assert_eq!(feature, "cgroup"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_feature_tokens_are_case_sensitive() {
        assert!(with_features(&["UTS"]).clone_flags().is_err());
        assert!(with_features(&["mnt"]).clone_flags().is_err());
    }

    #[test]
    fn test_id_map_table_format() {
        let config = NamespaceConfig {
            uid_mappings: vec![
                IdMapping::root_to(1000),
                IdMapping {
                    container_id: 1,
                    host_id: 100_000,
                    size: 65536,
                },
            ],
            ..NamespaceConfig::default()
        };

        let table = config.uid_map_table();
        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.to_proc_format(), "0 1000 1\n1 100000 65536\n");
    }

    #[test]
    fn test_empty_id_map_table() {
        let table = IdMapTable::new(&[]);
        assert!(table.is_empty());
        assert_eq!(table.to_proc_format(), "");
    }

    #[test]
    fn test_overlay_keeps_absent_fields() {
        let config = NamespaceConfig::from_json(r#"{"Id": "web", "Features": ["uts"]}"#).unwrap();
        assert_eq!(config.id.as_str(), "web");
        assert_eq!(config.features, ["uts"]);
        assert_eq!(config.uid_mappings, NamespaceConfig::default().uid_mappings);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = NamespaceConfig::from_json(r#"{"Features": "uts"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = NamespaceConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = NamespaceConfig {
            id: InstanceId::new("abc123"),
            features: vec!["user".into(), "ns".into()],
            uid_mappings: vec![
                IdMapping::root_to(1000),
                IdMapping {
                    container_id: 1,
                    host_id: 100_000,
                    size: 1000,
                },
            ],
            gid_mappings: vec![IdMapping::root_to(1000)],
            rootfs: PathBuf::from("/srv/rootfs"),
            mounts: Vec::new(),
            network_addr: String::new(),
            exec: Exec {
                path: "/bin/sh".into(),
                args: vec!["-c".into(), "true".into()],
            },
        };

        let json = config.to_json().unwrap();
        assert!(json.contains("\"RootFS\":\"/srv/rootfs\""));
        assert!(json.contains("\"UidMappings\":[{\"ContainerId\":0,\"HostId\":1000,\"Size\":1}"));
        assert_eq!(NamespaceConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_roundtrip_with_mounts() {
        let config = NamespaceConfig {
            mounts: vec![
                Mount {
                    device: "proc".into(),
                    target: "/proc".into(),
                    fs_type: "proc".into(),
                    flags: vec!["nosuid".into(), "noexec".into(), "nodev".into()],
                    options: String::new(),
                },
                Mount {
                    device: "tmpfs".into(),
                    target: "/tmp".into(),
                    fs_type: "tmpfs".into(),
                    flags: Vec::new(),
                    options: "size=64m,mode=1777".into(),
                },
            ],
            ..with_features(&["ns"])
        };

        let json = config.to_json().unwrap();
        assert!(json.contains("\"Type\":\"proc\""));
        assert!(json.contains("\"Flags\":[\"nosuid\",\"noexec\",\"nodev\"]"));
        assert!(json.contains("\"Options\":\"size=64m,mode=1777\""));
        assert!(!json.contains("FsType"));

        let decoded = NamespaceConfig::from_json(&json).unwrap();
        assert_eq!(decoded.mounts, config.mounts);
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_mount_wire_names() {
        let json = r#"{"Mounts": [{"Target": "/sys", "Type": "sysfs", "Flags": ["ro"]}]}"#;
        let config = NamespaceConfig::from_json(json).unwrap();

        assert_eq!(config.mounts.len(), 1);
        assert_eq!(config.mounts[0].fs_type, "sysfs");
        assert_eq!(config.mounts[0].flags, ["ro"]);
        assert!(config.mounts[0].options.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut config = NamespaceConfig::default();
        config.apply_overrides(ConfigOverrides {
            id: Some("abc".into()),
            rootfs: Some(PathBuf::from("/srv/root")),
            network_addr: None,
        });

        assert_eq!(config.id.as_str(), "abc");
        assert_eq!(config.rootfs, PathBuf::from("/srv/root"));
        assert!(config.network_addr.is_empty());
    }

    #[test]
    fn test_resolve_fills_default_mappings_for_user() {
        let config = NamespaceConfig {
            uid_mappings: Vec::new(),
            gid_mappings: Vec::new(),
            ..with_features(&["user"])
        }
        .resolve()
        .unwrap();

        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        assert_eq!(config.uid_mappings, [IdMapping::root_to(uid)]);
        assert_eq!(config.gid_mappings, [IdMapping::root_to(gid)]);
    }

    #[test]
    fn test_resolve_leaves_mappings_without_user() {
        let config = NamespaceConfig {
            uid_mappings: Vec::new(),
            ..with_features(&["uts"])
        }
        .resolve()
        .unwrap();
        assert!(config.uid_mappings.is_empty());
    }

    #[test]
    fn test_validate_rejects_overlapping_mappings() {
        let config = NamespaceConfig {
            uid_mappings: vec![
                IdMapping {
                    container_id: 0,
                    host_id: 1000,
                    size: 10,
                },
                IdMapping {
                    container_id: 5,
                    host_id: 5000,
                    size: 10,
                },
            ],
            ..with_features(&["user"])
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_validate_rejects_zero_size_mapping() {
        let config = NamespaceConfig {
            gid_mappings: vec![IdMapping {
                container_id: 0,
                host_id: 1000,
                size: 0,
            }],
            ..with_features(&["user"])
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_network_addr() {
        let mut config = with_features(&["net"]);
        config.network_addr = "10.0.0.2/24".into();
        assert!(config.validate().is_ok());
        let net = config.network_address().unwrap().unwrap();
        assert_eq!(net.ip().to_string(), "10.0.0.2");
        assert_eq!(net.prefix(), 24);

        config.network_addr = "not-an-address".into();
        assert!(matches!(config.validate().unwrap_err(), Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_validate_relative_rootfs() {
        let mut config = with_features(&["ns"]);
        config.rootfs = PathBuf::from("relative/root");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_non_utf8_rootfs() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut config = with_features(&["ns"]);
        config.rootfs = PathBuf::from(OsStr::from_bytes(b"/srv/root\xff"));

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_validate_id_length() {
        // "lxns-" plus 59 bytes is exactly the hostname limit
        let mut config = with_features(&["uts"]);
        config.id = InstanceId::new("a".repeat(HOST_NAME_MAX - 5));
        assert!(config.validate().is_ok());

        config.id = InstanceId::new("a".repeat(HOST_NAME_MAX - 4));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("too long"));
    }
}
