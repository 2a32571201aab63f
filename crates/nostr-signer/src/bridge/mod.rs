//! JSON method surface exposed to the host runtime.
//!
//! The host invokes methods by name with a JSON object of parameters and
//! receives either a JSON object or a rejection message. Rejections are the
//! display text of the underlying [`SignerError`].
//!
//! Operation methods may open the signer and wait for the user, so
//! [`HostBridge::call`] must be driven on a Tokio runtime with the time
//! driver enabled.

use serde_json::{Map, Value, json};
use tracing::debug;

use nostr_signer_config::Config;

use crate::catalog::{OperationKind, Params, params};
use crate::direct::ContentQuery;
use crate::discovery::PackageResolver;
use crate::dispatcher::{Dispatcher, SignerPorts};
use crate::error::SignerError;
use crate::interactive::{ActivityLauncher, PendingCalls};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Tracing target for bridge calls.
const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bridge");

/// Host method names that are not catalog operations.
pub mod methods {
    /// Selects the active signer package.
    pub const SET_PACKAGE_NAME: &str = "setPackageName";
    /// Reports whether a signer is installed.
    pub const IS_EXTERNAL_SIGNER_INSTALLED: &str = "isExternalSignerInstalled";
    /// Lists installed signers.
    pub const GET_INSTALLED_SIGNER_APPS: &str = "getInstalledSignerApps";
    /// Alias of [`GET_INSTALLED_SIGNER_APPS`].
    pub const LIST_INSTALLED_SIGNERS: &str = "listInstalledSigners";
}

/// Adapts host method calls onto a [`Dispatcher`].
#[derive(Debug)]
pub struct HostBridge<R, Q, L> {
    dispatcher: Dispatcher<R, Q, L>,
    telemetry: Option<TelemetryHandle>,
}

impl<R, Q, L> HostBridge<R, Q, L> {
    /// Wraps a dispatcher, leaving telemetry to the host.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher<R, Q, L>) -> Self {
        Self {
            dispatcher,
            telemetry: None,
        }
    }

    /// Starts a bridge from loaded configuration.
    ///
    /// Installs telemetry, then builds a dispatcher with the configured
    /// timeout and preselected signer package.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the log filter is invalid or another
    /// global subscriber is already installed.
    pub fn from_config(
        ports: SignerPorts<R, Q, L>,
        pending: PendingCalls,
        config: &Config,
    ) -> Result<Self, TelemetryError> {
        let handle = telemetry::initialise(config)?;
        Ok(Self {
            dispatcher: Dispatcher::from_config(ports, pending, config),
            telemetry: Some(handle),
        })
    }

    /// Telemetry installed by [`HostBridge::from_config`], if any.
    #[must_use]
    pub const fn telemetry(&self) -> Option<TelemetryHandle> {
        self.telemetry
    }

    /// Returns the wrapped dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher<R, Q, L> {
        &self.dispatcher
    }
}

impl<R, Q, L> HostBridge<R, Q, L>
where
    R: PackageResolver,
    Q: ContentQuery,
    L: ActivityLauncher,
{
    /// Invokes a host method.
    ///
    /// Must be polled on a Tokio runtime with the time driver enabled;
    /// interactive round trips wait under a Tokio timeout.
    ///
    /// # Errors
    ///
    /// Returns the display text of the [`SignerError`] that rejected the
    /// call.
    pub async fn call(&self, method: &str, arguments: &Map<String, Value>) -> Result<Value, String> {
        let outcome = self.route(method, arguments).await;
        if let Err(err) = &outcome {
            debug!(target: BRIDGE_TARGET, method, error = %err, "host call rejected");
        }
        outcome.map_err(|err| err.to_string())
    }

    async fn route(&self, method: &str, arguments: &Map<String, Value>) -> Result<Value, SignerError> {
        let supplied = string_params(arguments)?;
        match method {
            methods::SET_PACKAGE_NAME => {
                let package = supplied
                    .get(params::PACKAGE_NAME)
                    .ok_or_else(|| SignerError::missing_parameter(params::PACKAGE_NAME))?;
                self.dispatcher.set_package_name(package)?;
                Ok(Value::Object(Map::new()))
            }
            methods::IS_EXTERNAL_SIGNER_INSTALLED => {
                let package = supplied.get(params::PACKAGE_NAME).map(String::as_str);
                let installed = self.dispatcher.is_external_signer_installed(package);
                Ok(json!({ "installed": installed }))
            }
            methods::GET_INSTALLED_SIGNER_APPS | methods::LIST_INSTALLED_SIGNERS => {
                let apps = serde_json::to_value(self.dispatcher.list_installed_signers())
                    .map_err(|err| SignerError::Internal {
                        message: format!("failed to serialise signer listing: {err}"),
                    })?;
                Ok(json!({ "apps": apps }))
            }
            other => {
                let kind = OperationKind::from_method_name(other)
                    .ok_or_else(|| SignerError::unknown_kind(other))?;
                self.dispatcher.execute(kind, &supplied).await?.to_json()
            }
        }
    }
}

/// Converts scalar JSON arguments into string parameters.
///
/// `null` counts as absent. Arrays and objects are rejected.
fn string_params(arguments: &Map<String, Value>) -> Result<Params, SignerError> {
    let mut supplied = Params::new();
    for (name, value) in arguments {
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text.clone(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(SignerError::InvalidParameter {
                    name: name.clone(),
                    message: "expected a string, number, or boolean".to_owned(),
                });
            }
        };
        supplied.insert(name.clone(), text);
    }
    Ok(supplied)
}
