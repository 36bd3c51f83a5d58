//! # Kernel
//!
//! The event-staged dispatcher. Every request runs through a fixed list of
//! stages:
//!
//! ```text
//! REQUEST → ROUTE → CONTROLLER → CONTROLLER_ARGUMENTS → INVOKE → RESPONSE → FINISH_REQUEST → SEND_RESPONSE
//! ```
//!
//! Each stage except INVOKE dispatches an event ([`RequestEvent`],
//! [`RouteEvent`], ...). A listener that sets a response on one of the first
//! four events skips the rest of the pipeline up to FINISH_REQUEST; FINISH
//! and SEND listeners always run. Failures at any stage go through the
//! error handler ([`Kernel::handle_error`]), so [`Kernel::handle`],
//! [`Kernel::run`] and [`Kernel::mock`] never fail.
//!
//! ## Example
//!
//! ```rust
//! use stick_dispatch::controller::{Controller, Output, ParamSpec};
//! use stick_dispatch::config::KernelConfig;
//! use stick_dispatch::kernel::{Kernel, RequestEvent};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! kernel
//!     .route(
//!         "GET hello /hello/@name",
//!         Controller::new("hello", vec![ParamSpec::string("name")], |inv| {
//!             Ok(Output::from(format!("Hello {}", inv.args.str(0).unwrap_or("?"))))
//!         }),
//!     )
//!     .unwrap();
//! kernel.on::<RequestEvent, _>(0, |_event| Ok(()));
//!
//! let response = kernel.mock("GET /hello/world");
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body_str(), "Hello world");
//! ```

mod context;
mod core;
mod error;
mod events;
mod render;

pub use context::{RequestContext, Stage};
pub use self::core::{Kernel, StageOutcome};
pub use error::ErrorPayload;
pub use events::{
    ControllerArgumentsEvent, ControllerEvent, ErrorEvent, FinishRequestEvent, RequestEvent,
    ResponseEvent, RouteEvent, SendResponseEvent,
};
pub use render::{DefaultRenderer, ResponseRenderer};
