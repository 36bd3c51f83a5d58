//! # stick-dispatch
//!
//! A request dispatch core: a route table with aliases and reverse URL
//! building, a path matcher with typed parameters and wildcards, an argument
//! resolver, an event-staged dispatcher and a central error handler.
//!
//! ## Architecture
//!
//! - **[`router`]** - route expressions, path templates, resolution order and URL building
//! - **[`controller`]** - controller references, parameter descriptors and the registry
//! - **[`resolver`]** - binds parameter descriptors to request values
//! - **[`container`]** - type-keyed services injected into controllers
//! - **[`event`]** - prioritized listener registry with one-shot listeners
//! - **[`kernel`]** - the staged pipeline, its events and the error handler
//! - **[`server`]** - request and response types and response sinks
//! - **[`config`]** - kernel flags and file-based route tables
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ## Request flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host
//!     participant Kernel
//!     participant Router
//!     participant Listeners
//!     participant Controller
//!     participant Sink
//!
//!     Host->>Kernel: handle(Request)
//!     Kernel->>Listeners: RequestEvent
//!     Kernel->>Router: resolve_request
//!     Kernel->>Listeners: RouteEvent, ControllerEvent
//!     Kernel->>Kernel: resolve_arguments
//!     Kernel->>Listeners: ControllerArgumentsEvent
//!     Kernel->>Controller: call(Invocation)
//!     Kernel->>Listeners: ResponseEvent, FinishRequestEvent
//!     Kernel->>Listeners: SendResponseEvent
//!     Kernel->>Sink: emit(Response)
//!     Kernel-->>Host: Response
//! ```
//!
//! Failures at any stage are turned into responses by the error handler;
//! the entry points never return errors.

pub mod cli;
pub mod config;
pub mod container;
pub mod controller;
pub mod echo;
pub mod error;
pub mod event;
pub mod ids;
pub mod kernel;
pub mod logging;
pub mod resolver;
pub mod router;
pub mod server;

pub use config::KernelConfig;
pub use controller::{Controller, ControllerRef, Output, ParamSpec};
pub use error::{DispatchError, RouteParseError};
pub use kernel::Kernel;
pub use router::{RouteMatch, RouteOptions, Router};
pub use server::{Request, Response};
