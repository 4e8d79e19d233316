use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::capability::{Capability, CapabilitySet};
use crate::violation::SandboxViolation;

/// Files the write guard refuses unconditionally, relative to the working
/// directory. Capability grants can widen general filesystem access but can
/// never re-enable tampering with the runtime's own integrity-critical
/// files.
pub const PROTECTED_PATHS: &[&str] = &["Cargo.toml", "Cargo.lock", "ark.toml", ".env"];

const PROTECTED_DIRS: &[&str] = &["src"];

/// The capability layer's single entry point: a granted-token set plus the
/// resolved working directory every filesystem path is confined to.
#[derive(Clone, Debug)]
pub struct Sandbox {
    caps: CapabilitySet,
    root: PathBuf,
}

impl Sandbox {
    /// Confines paths to the process working directory.
    pub fn new(caps: CapabilitySet) -> Result<Self, SandboxViolation> {
        let cwd = std::env::current_dir().map_err(|e| SandboxViolation::Unresolvable {
            path: ".".to_string(),
            reason: e.to_string(),
        })?;
        Self::with_root(caps, &cwd)
    }

    /// Confines paths to an explicit root instead of the process cwd.
    pub fn with_root(caps: CapabilitySet, root: &Path) -> Result<Self, SandboxViolation> {
        let root = root
            .canonicalize()
            .map_err(|e| SandboxViolation::Unresolvable {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { caps, root })
    }

    pub fn caps(&self) -> &CapabilitySet {
        &self.caps
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn check(&self, cap: Capability) -> Result<(), SandboxViolation> {
        self.caps.check(cap)
    }

    /// Validates a script-supplied filesystem path and returns its resolved
    /// real location. Rejects paths that still reach upward after lexical
    /// normalization, paths whose symlink-resolved target leaves the root,
    /// and writes to the protected file list. Writes require `fs_write`.
    pub fn validate_path(
        &self,
        path: &Path,
        for_write: bool,
    ) -> Result<PathBuf, SandboxViolation> {
        let normalized = lexical_normalize(path)?;
        let joined = if normalized.is_absolute() {
            normalized
        } else {
            self.root.join(normalized)
        };
        let real = resolve_real(&joined)?;

        if !real.starts_with(&self.root) {
            return Err(SandboxViolation::OutsideWorkspace {
                path: path.display().to_string(),
            });
        }

        if for_write {
            self.caps.check(Capability::FsWrite)?;
            if let Ok(rel) = real.strip_prefix(&self.root) {
                if is_protected(rel) {
                    return Err(SandboxViolation::ProtectedPath {
                        path: rel.display().to_string(),
                    });
                }
            }
        }

        Ok(real)
    }

    /// Validates an outbound URL against the SSRF policy. Every address the
    /// host resolves to is classified: loopback needs the `net` token,
    /// private/link-local/multicast/reserved/unspecified ranges are rejected
    /// regardless of granted capabilities. Callers following redirects must
    /// re-validate each redirect target through this same method.
    pub fn validate_url(&self, url: &str) -> Result<(), SandboxViolation> {
        let parsed = Url::parse(url).map_err(|e| SandboxViolation::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SandboxViolation::SchemeNotAllowed {
                    scheme: other.to_string(),
                });
            }
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| SandboxViolation::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?;
        // `[::1]` style hosts keep their brackets in host_str; strip for
        // the resolver.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = parsed.port_or_known_default().unwrap_or(80);

        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|_| SandboxViolation::UnresolvedHost {
                host: host.to_string(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(SandboxViolation::UnresolvedHost {
                host: host.to_string(),
            });
        }

        for addr in addrs {
            let ip = addr.ip();
            if is_blocked_range(ip) {
                return Err(SandboxViolation::BlockedAddress { addr: ip });
            }
            if ip.is_loopback() && !self.caps.is_granted(Capability::Net) {
                return Err(SandboxViolation::LoopbackRequiresNet { addr: ip });
            }
        }

        Ok(())
    }
}

/// Removes `.` segments and applies `..` lexically; a `..` that would climb
/// past the path's own start is a traversal attempt.
fn lexical_normalize(path: &Path) -> Result<PathBuf, SandboxViolation> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(SandboxViolation::ParentTraversal {
                        path: path.display().to_string(),
                    });
                }
                out.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                out.push(comp.as_os_str());
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Ok(out)
}

/// Canonicalizes the deepest existing ancestor (resolving symlinks), then
/// re-appends the not-yet-existing remainder. Lets the write guard vet
/// files that will be created by the call.
fn resolve_real(path: &Path) -> Result<PathBuf, SandboxViolation> {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut real) => {
                for part in rest.iter().rev() {
                    real.push(part);
                }
                return Ok(real);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) if !parent.as_os_str().is_empty() => {
                        rest.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => {
                        return Err(SandboxViolation::Unresolvable {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                return Err(SandboxViolation::Unresolvable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn is_protected(rel: &Path) -> bool {
    if PROTECTED_PATHS.iter().any(|p| rel == Path::new(p)) {
        return true;
    }
    PROTECTED_DIRS
        .iter()
        .any(|d| rel.starts_with(Path::new(d)))
}

fn is_blocked_range(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(v4: Ipv4Addr) -> bool {
    v4.is_unspecified()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_multicast()
        || v4.is_broadcast()
        // 240.0.0.0/4 reserved block
        || v4.octets()[0] >= 240
}

fn is_blocked_v6(v6: Ipv6Addr) -> bool {
    let seg0 = v6.segments()[0];
    v6.is_unspecified()
        || v6.is_multicast()
        // fc00::/7 unique-local
        || (seg0 & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (seg0 & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_with(caps: CapabilitySet) -> Sandbox {
        let cwd = std::env::current_dir().unwrap();
        Sandbox::with_root(caps, &cwd).unwrap()
    }

    #[test]
    fn loopback_url_requires_net_token() {
        let sb = sandbox_with(CapabilitySet::empty());
        let err = sb.validate_url("http://127.0.0.1/x").unwrap_err();
        assert!(matches!(err, SandboxViolation::LoopbackRequiresNet { .. }));

        let sb = sandbox_with(CapabilitySet::from_tokens([Capability::Net]));
        assert!(sb.validate_url("http://127.0.0.1/x").is_ok());
    }

    #[test]
    fn metadata_endpoint_blocked_even_with_all_tokens() {
        let sb = sandbox_with(CapabilitySet::grant_all());
        let err = sb.validate_url("http://169.254.169.254/").unwrap_err();
        assert!(matches!(err, SandboxViolation::BlockedAddress { .. }));
    }

    #[test]
    fn private_ranges_blocked_unconditionally() {
        let sb = sandbox_with(CapabilitySet::grant_all());
        for url in [
            "http://10.0.0.1/",
            "http://172.16.3.4/",
            "http://192.168.1.1/",
            "http://0.0.0.0/",
            "http://240.0.0.1/",
        ] {
            let err = sb.validate_url(url).unwrap_err();
            assert!(
                matches!(err, SandboxViolation::BlockedAddress { .. }),
                "expected {url} to be blocked, got {err:?}"
            );
        }
    }

    #[test]
    fn ipv6_loopback_gated_on_net() {
        let sb = sandbox_with(CapabilitySet::empty());
        let err = sb.validate_url("http://[::1]/").unwrap_err();
        assert!(matches!(err, SandboxViolation::LoopbackRequiresNet { .. }));
    }

    #[test]
    fn non_http_scheme_rejected() {
        let sb = sandbox_with(CapabilitySet::grant_all());
        let err = sb.validate_url("ftp://198.51.100.7/file").unwrap_err();
        assert_eq!(
            err,
            SandboxViolation::SchemeNotAllowed {
                scheme: "ftp".to_string()
            }
        );
    }

    #[test]
    fn lexical_normalize_resolves_inner_dotdot() {
        let p = lexical_normalize(Path::new("a/../b.txt")).unwrap();
        assert_eq!(p, PathBuf::from("b.txt"));
    }

    #[test]
    fn lexical_normalize_rejects_leading_dotdot() {
        assert!(lexical_normalize(Path::new("../secret.ark")).is_err());
        assert!(lexical_normalize(Path::new("a/../../x")).is_err());
    }
}
