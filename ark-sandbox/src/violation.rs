use std::net::IpAddr;

use miette::Diagnostic;
use thiserror::Error;

use crate::capability::Capability;

/// A denied operation. Always fatal for the triggering call; the runtime
/// surfaces it to the script like any other runtime error.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum SandboxViolation {
    #[error("capability '{0}' is not granted")]
    #[diagnostic(code(ark::sandbox::capability))]
    MissingCapability(Capability),

    #[error("unknown capability token '{token}'")]
    #[diagnostic(code(ark::sandbox::config))]
    UnknownToken { token: String },

    #[error("path '{path}' escapes via a parent-directory segment")]
    #[diagnostic(code(ark::sandbox::path))]
    ParentTraversal { path: String },

    #[error("path '{path}' resolves outside the working directory")]
    #[diagnostic(code(ark::sandbox::path))]
    OutsideWorkspace { path: String },

    #[error("path '{path}' is integrity-protected and may not be written")]
    #[diagnostic(code(ark::sandbox::path))]
    ProtectedPath { path: String },

    #[error("cannot resolve path '{path}': {reason}")]
    #[diagnostic(code(ark::sandbox::path))]
    Unresolvable { path: String, reason: String },

    #[error("invalid url '{url}': {reason}")]
    #[diagnostic(code(ark::sandbox::url))]
    InvalidUrl { url: String, reason: String },

    #[error("url scheme '{scheme}' is not allowed")]
    #[diagnostic(code(ark::sandbox::url))]
    SchemeNotAllowed { scheme: String },

    #[error("host '{host}' did not resolve to any address")]
    #[diagnostic(code(ark::sandbox::url))]
    UnresolvedHost { host: String },

    #[error("address {addr} is in a blocked range")]
    #[diagnostic(code(ark::sandbox::ssrf))]
    BlockedAddress { addr: IpAddr },

    #[error("loopback address {addr} requires the 'net' capability")]
    #[diagnostic(code(ark::sandbox::ssrf))]
    LoopbackRequiresNet { addr: IpAddr },
}
