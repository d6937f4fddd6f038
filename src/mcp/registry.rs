//! Capability registries for tools, resources and prompts.
//!
//! Each registry maps a key (tool name, resource URI, prompt name) to a
//! descriptor and a handler. Entries keep their first registration position;
//! re-registering a key replaces the entry in place.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::mcp::types::{
    CapabilityKind, PromptDescriptor, PromptResult, ResourceContents, ResourceDescriptor,
    ToolCallResult, ToolDescriptor,
};

/// Arguments passed to a tool handler.
pub type ToolArguments = Map<String, Value>;

/// Arguments passed to a prompt handler.
pub type PromptArguments = Option<HashMap<String, String>>;

/// Type-erased tool handler.
pub type ToolHandler =
    Arc<dyn Fn(ToolArguments) -> BoxFuture<'static, Result<ToolCallResult, HandlerError>> + Send + Sync>;

/// Type-erased resource handler.
pub type ResourceHandler =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<ResourceContents>, HandlerError>> + Send + Sync>;

/// Type-erased prompt handler.
pub type PromptHandler =
    Arc<dyn Fn(PromptArguments) -> BoxFuture<'static, Result<PromptResult, HandlerError>> + Send + Sync>;

/// Wraps an async closure as a [`ToolHandler`].
pub fn tool_handler<F, Fut>(handler: F) -> ToolHandler
where
    F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolCallResult, HandlerError>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

/// Wraps an async closure as a [`ResourceHandler`].
pub fn resource_handler<F, Fut>(handler: F) -> ResourceHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<ResourceContents>, HandlerError>> + Send + 'static,
{
    Arc::new(move || handler().boxed())
}

/// Wraps an async closure as a [`PromptHandler`].
pub fn prompt_handler<F, Fut>(handler: F) -> PromptHandler
where
    F: Fn(PromptArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PromptResult, HandlerError>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct Entry<D, H> {
    /// Static metadata.
    pub descriptor: D,
    /// What runs when the capability is invoked.
    pub handler: H,
}

impl<D: std::fmt::Debug, H> std::fmt::Debug for Entry<D, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A registration waiting to be applied by the bridge.
pub enum Registration {
    /// A tool.
    Tool(ToolDescriptor, ToolHandler),
    /// A resource.
    Resource(ResourceDescriptor, ResourceHandler),
    /// A prompt.
    Prompt(PromptDescriptor, PromptHandler),
}

impl Registration {
    /// Which registry this registration targets.
    #[must_use]
    pub const fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool(..) => CapabilityKind::Tools,
            Self::Resource(..) => CapabilityKind::Resources,
            Self::Prompt(..) => CapabilityKind::Prompts,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(d, _) => f.debug_tuple("Tool").field(&d.name).finish(),
            Self::Resource(d, _) => f.debug_tuple("Resource").field(&d.uri).finish(),
            Self::Prompt(d, _) => f.debug_tuple("Prompt").field(&d.name).finish(),
        }
    }
}

/// The three capability registries.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: IndexMap<String, Entry<ToolDescriptor, ToolHandler>>,
    resources: IndexMap<String, Entry<ResourceDescriptor, ResourceHandler>>,
    prompts: IndexMap<String, Entry<PromptDescriptor, PromptHandler>>,
}

impl CapabilityRegistry {
    /// Creates empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a registration and returns the kind it touched.
    pub fn apply(&mut self, registration: Registration) -> CapabilityKind {
        let kind = registration.kind();
        match registration {
            Registration::Tool(descriptor, handler) => self.register_tool(descriptor, handler),
            Registration::Resource(descriptor, handler) => {
                self.register_resource(descriptor, handler);
            }
            Registration::Prompt(descriptor, handler) => {
                self.register_prompt(descriptor, handler);
            }
        }
        kind
    }

    /// Inserts or replaces a tool, keyed by name.
    pub fn register_tool(&mut self, descriptor: ToolDescriptor, handler: ToolHandler) {
        self.tools.insert(
            descriptor.name.clone(),
            Entry {
                descriptor,
                handler,
            },
        );
    }

    /// Inserts or replaces a resource, keyed by URI.
    pub fn register_resource(&mut self, descriptor: ResourceDescriptor, handler: ResourceHandler) {
        self.resources.insert(
            descriptor.uri.clone(),
            Entry {
                descriptor,
                handler,
            },
        );
    }

    /// Inserts or replaces a prompt, keyed by name.
    pub fn register_prompt(&mut self, descriptor: PromptDescriptor, handler: PromptHandler) {
        self.prompts.insert(
            descriptor.name.clone(),
            Entry {
                descriptor,
                handler,
            },
        );
    }

    /// Tool descriptors in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|e| &e.descriptor)
    }

    /// Resource descriptors in registration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values().map(|e| &e.descriptor)
    }

    /// Prompt descriptors in registration order.
    pub fn prompts(&self) -> impl Iterator<Item = &PromptDescriptor> {
        self.prompts.values().map(|e| &e.descriptor)
    }

    /// Looks up a tool handler by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<ToolHandler> {
        self.tools.get(name).map(|e| Arc::clone(&e.handler))
    }

    /// Looks up a resource handler by URI.
    #[must_use]
    pub fn resource(&self, uri: &str) -> Option<ResourceHandler> {
        self.resources.get(uri).map(|e| Arc::clone(&e.handler))
    }

    /// Looks up a prompt handler by name.
    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<PromptHandler> {
        self.prompts.get(name).map(|e| Arc::clone(&e.handler))
    }

    /// Number of entries in the given registry.
    #[must_use]
    pub fn len(&self, kind: CapabilityKind) -> usize {
        match kind {
            CapabilityKind::Tools => self.tools.len(),
            CapabilityKind::Resources => self.resources.len(),
            CapabilityKind::Prompts => self.prompts.len(),
        }
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}
