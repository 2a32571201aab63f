//! Discovery of signer applications installed on the device.
//!
//! Signer applications declare that they handle the `nostrsigner:` URI
//! scheme. [`Discovery`] asks a [`PackageResolver`] which applications do so
//! and presents each as a [`SignerIdentity`]. Nothing is cached: installed
//! applications can change between calls, so every call re-queries.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::debug;

/// URI scheme declared by signer applications.
pub const SIGNER_SCHEME: &str = "nostrsigner:";

/// Tracing target for discovery operations.
const DISCOVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::discovery");

/// An application handler returned by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandler {
    package_id: String,
    label: Option<String>,
    icon_png: Vec<u8>,
}

impl ResolvedHandler {
    /// Creates a handler record.
    #[must_use]
    pub fn new(package_id: impl Into<String>, label: Option<String>, icon_png: Vec<u8>) -> Self {
        Self {
            package_id: package_id.into(),
            label,
            icon_png,
        }
    }

    /// Returns the handling package.
    #[must_use]
    pub const fn package_id(&self) -> &str {
        self.package_id.as_str()
    }
}

/// Operating-system service answering "which applications handle this
/// scheme".
pub trait PackageResolver {
    /// Returns every handler for `scheme`, narrowed to `package` when given.
    fn resolve_handlers(&self, scheme: &str, package: Option<&str>) -> Vec<ResolvedHandler>;
}

/// A signer application available for selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "SignerListing")]
pub struct SignerIdentity {
    package_id: String,
    display_name: String,
    icon_png: Vec<u8>,
}

impl SignerIdentity {
    /// Creates an identity.
    #[must_use]
    pub fn new(
        package_id: impl Into<String>,
        display_name: impl Into<String>,
        icon_png: Vec<u8>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            display_name: display_name.into(),
            icon_png,
        }
    }

    /// Returns the package identifier used to route requests.
    #[must_use]
    pub const fn package_id(&self) -> &str {
        self.package_id.as_str()
    }

    /// Returns the user-facing application name.
    #[must_use]
    pub const fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the raw PNG icon bytes.
    #[must_use]
    pub fn icon_png(&self) -> &[u8] {
        &self.icon_png
    }

    /// Returns the icon as standard base64 text without line breaks.
    #[must_use]
    pub fn icon_base64(&self) -> String {
        STANDARD.encode(&self.icon_png)
    }

    /// Returns the icon as a self-contained `data:` URI.
    ///
    /// # Example
    ///
    /// ```
    /// use nostr_signer::SignerIdentity;
    ///
    /// let signer = SignerIdentity::new("app.signer", "Signer", vec![0x89, 0x50]);
    /// assert_eq!(signer.icon_data_uri(), "data:image/png;base64,iVA=");
    /// ```
    #[must_use]
    pub fn icon_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.icon_base64())
    }
}

impl From<ResolvedHandler> for SignerIdentity {
    fn from(handler: ResolvedHandler) -> Self {
        Self {
            package_id: handler.package_id,
            display_name: handler.label.unwrap_or_default(),
            icon_png: handler.icon_png,
        }
    }
}

/// Host-facing listing entry.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignerListing {
    name: String,
    package_name: String,
    icon: String,
    icon_url: String,
}

impl From<SignerIdentity> for SignerListing {
    fn from(identity: SignerIdentity) -> Self {
        let icon = identity.icon_base64();
        let icon_url = identity.icon_data_uri();
        Self {
            name: identity.display_name,
            package_name: identity.package_id,
            icon,
            icon_url,
        }
    }
}

/// Finite sequence of signers produced by one discovery call.
pub type Candidates = std::vec::IntoIter<SignerIdentity>;

/// Enumerates signer applications through a [`PackageResolver`].
#[derive(Debug, Clone, Default)]
pub struct Discovery<R> {
    resolver: R,
}

impl<R> Discovery<R> {
    /// Creates a discovery front-end over the given resolver.
    #[must_use]
    pub const fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Returns the underlying resolver.
    #[must_use]
    pub const fn resolver(&self) -> &R {
        &self.resolver
    }
}

impl<R: PackageResolver> Discovery<R> {
    /// Lists every installed signer. Re-invoke to refresh.
    #[must_use]
    pub fn list_candidates(&self) -> Candidates {
        let handlers = self.resolver.resolve_handlers(SIGNER_SCHEME, None);
        debug!(
            target: DISCOVERY_TARGET,
            count = handlers.len(),
            "resolved signer handlers"
        );
        handlers
            .into_iter()
            .map(SignerIdentity::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Returns `true` when `package` resolves at least one handler.
    #[must_use]
    pub fn is_installed(&self, package: &str) -> bool {
        let installed = !self
            .resolver
            .resolve_handlers(SIGNER_SCHEME, Some(package))
            .is_empty();
        debug!(
            target: DISCOVERY_TARGET,
            package,
            installed,
            "checked signer installation"
        );
        installed
    }

    /// Returns `true` when any signer is installed.
    #[must_use]
    pub fn any_installed(&self) -> bool {
        !self
            .resolver
            .resolve_handlers(SIGNER_SCHEME, None)
            .is_empty()
    }
}
