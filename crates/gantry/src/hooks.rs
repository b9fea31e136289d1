//! Hook/event bus.
//!
//! Plugins register async callbacks on named pipeline events. Each event has
//! one payload type; a callback receives the payload, may transform it, and
//! hands it back. Callbacks for the same event run one after another in
//! registration order, each seeing the previous callback's result.
//!
//! Registration happens on a [`HookRegistry`], which is frozen into an
//! immutable [`HookBus`] before the pipeline runs.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use gantry_spec::{Api, Endpoint};
use thiserror::Error;

use crate::api::ApiReport;
use crate::context::DeployContext;
use crate::injector::IntegrationDataInjector;

/// Pipeline events plugins can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeApisLoad,
    AfterApisLoad,
    BeforeEndpointsLoad,
    AfterEndpointsLoad,
    BeforeLoadIntegrations,
    AfterLoadIntegrations,
    BeforeAddIntegrationDataToEndpoints,
    AfterAddIntegrationDataToEndpoints,
    BeforeAddEndpointsToApis,
    AfterAddEndpointsToApis,
    BeforePublishAllApis,
    AfterPublishAllApis,
}

/// Payload of the integration-data events.
#[derive(Debug, Clone)]
pub struct IntegrationStage {
    pub injectors: Vec<Arc<dyn IntegrationDataInjector>>,
    pub endpoints: Vec<Endpoint>,
}

/// Payload of the endpoint-attachment events.
#[derive(Debug, Clone)]
pub struct AttachStage {
    pub apis: Vec<Api>,
    pub endpoints: Vec<Arc<Endpoint>>,
}

impl HookEvent {
    pub const ALL: [HookEvent; 12] = [
        HookEvent::BeforeApisLoad,
        HookEvent::AfterApisLoad,
        HookEvent::BeforeEndpointsLoad,
        HookEvent::AfterEndpointsLoad,
        HookEvent::BeforeLoadIntegrations,
        HookEvent::AfterLoadIntegrations,
        HookEvent::BeforeAddIntegrationDataToEndpoints,
        HookEvent::AfterAddIntegrationDataToEndpoints,
        HookEvent::BeforeAddEndpointsToApis,
        HookEvent::AfterAddEndpointsToApis,
        HookEvent::BeforePublishAllApis,
        HookEvent::AfterPublishAllApis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::BeforeApisLoad => "beforeApisLoad",
            HookEvent::AfterApisLoad => "afterApisLoad",
            HookEvent::BeforeEndpointsLoad => "beforeEndpointsLoad",
            HookEvent::AfterEndpointsLoad => "afterEndpointsLoad",
            HookEvent::BeforeLoadIntegrations => "beforeLoadIntegrations",
            HookEvent::AfterLoadIntegrations => "afterLoadIntegrations",
            HookEvent::BeforeAddIntegrationDataToEndpoints => "beforeAddIntegrationDataToEndpoints",
            HookEvent::AfterAddIntegrationDataToEndpoints => "afterAddIntegrationDataToEndpoints",
            HookEvent::BeforeAddEndpointsToApis => "beforeAddEndpointsToApis",
            HookEvent::AfterAddEndpointsToApis => "afterAddEndpointsToApis",
            HookEvent::BeforePublishAllApis => "beforePublishAllApis",
            HookEvent::AfterPublishAllApis => "afterPublishAllApis",
        }
    }

    /// The payload type callbacks on this event receive and return.
    fn payload(&self) -> (TypeId, &'static str) {
        fn of<T: 'static>() -> (TypeId, &'static str) {
            (TypeId::of::<T>(), type_name::<T>())
        }
        match self {
            HookEvent::BeforeApisLoad | HookEvent::BeforeEndpointsLoad => of::<()>(),
            HookEvent::AfterApisLoad | HookEvent::BeforePublishAllApis => of::<Vec<Api>>(),
            HookEvent::AfterEndpointsLoad => of::<Vec<Endpoint>>(),
            HookEvent::BeforeLoadIntegrations => of::<DeployContext>(),
            HookEvent::AfterLoadIntegrations => of::<Vec<Arc<dyn IntegrationDataInjector>>>(),
            HookEvent::BeforeAddIntegrationDataToEndpoints
            | HookEvent::AfterAddIntegrationDataToEndpoints => of::<IntegrationStage>(),
            HookEvent::BeforeAddEndpointsToApis | HookEvent::AfterAddEndpointsToApis => {
                of::<AttachStage>()
            }
            HookEvent::AfterPublishAllApis => of::<Vec<ApiReport>>(),
        }
    }

    fn check<P: 'static>(&self) -> Result<(), HookError> {
        let (expected, expected_name) = self.payload();
        if TypeId::of::<P>() == expected {
            Ok(())
        } else {
            Err(HookError::PayloadMismatch {
                event: self.name(),
                expected: expected_name,
                found: type_name::<P>(),
            })
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook on '{event}' must take {expected}, not {found}")]
    PayloadMismatch {
        event: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Returned by a callback to abort the run.
    #[error("{0}")]
    Callback(String),

    #[error("plugin '{plugin}' failed on '{event}': {message}")]
    Failed {
        plugin: String,
        event: &'static str,
        message: String,
    },
}

impl HookError {
    pub fn callback(message: impl Into<String>) -> Self {
        HookError::Callback(message.into())
    }
}

type Callback<P> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<P, HookError>> + Send + Sync>;

struct Registered {
    plugin: String,
    /// A `Callback<P>` for the event's payload type.
    callback: Box<dyn Any + Send + Sync>,
}

/// A named bundle of hooks.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, hooks: &mut HookRegistry) -> Result<(), HookError>;
}

/// Collects hooks before a run.
#[derive(Default)]
pub struct HookRegistry {
    current_plugin: Option<String>,
    plugins: Vec<String>,
    hooks: HashMap<HookEvent, Vec<Registered>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` on `event`. Fails if `P` is not the event's
    /// payload type.
    pub fn on<P, F, Fut>(&mut self, event: HookEvent, callback: F) -> Result<(), HookError>
    where
        P: Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, HookError>> + Send + 'static,
    {
        event.check::<P>()?;
        let callback: Callback<P> =
            Arc::new(move |payload: P| -> BoxFuture<'static, Result<P, HookError>> {
                Box::pin(callback(payload))
            });
        self.hooks.entry(event).or_default().push(Registered {
            plugin: self
                .current_plugin
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Let `plugin` register its hooks, attributing them to its name.
    pub fn register_plugin(&mut self, plugin: &dyn Plugin) -> Result<(), HookError> {
        self.current_plugin = Some(plugin.name().to_string());
        let result = plugin.register(self);
        self.current_plugin = None;
        result?;
        self.plugins.push(plugin.name().to_string());
        crate::log_plugin_registered!(plugin = plugin.name(), "plugin registered");
        Ok(())
    }

    pub fn freeze(self) -> HookBus {
        HookBus {
            plugins: self.plugins,
            hooks: self.hooks,
        }
    }
}

/// Immutable set of hooks shared by a run.
#[derive(Default)]
pub struct HookBus {
    plugins: Vec<String>,
    hooks: HashMap<HookEvent, Vec<Registered>>,
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .hooks
            .iter()
            .map(|(event, hooks)| (event.name(), hooks.len()))
            .collect();
        f.debug_struct("HookBus")
            .field("plugins", &self.plugins)
            .field("hooks", &counts)
            .finish()
    }
}

impl HookBus {
    /// A bus without hooks.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Number of callbacks registered on `event`.
    pub fn listeners(&self, event: HookEvent) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    /// Thread `payload` through every callback registered on `event` and
    /// return the result. The first failing callback aborts the chain.
    pub async fn fire<P: Send + 'static>(&self, event: HookEvent, payload: P) -> Result<P, HookError> {
        event.check::<P>()?;
        let mut payload = payload;
        for hook in self.hooks.get(&event).into_iter().flatten() {
            let callback = hook
                .callback
                .downcast_ref::<Callback<P>>()
                .ok_or_else(|| HookError::PayloadMismatch {
                    event: event.name(),
                    expected: event.payload().1,
                    found: type_name::<P>(),
                })?
                .clone();
            tracing::debug!(event = event.name(), plugin = %hook.plugin, "running hook");
            payload = callback(payload).await.map_err(|e| HookError::Failed {
                plugin: hook.plugin.clone(),
                event: event.name(),
                message: e.to_string(),
            })?;
        }
        Ok(payload)
    }
}
