//! # Router Module
//!
//! Route registration, path matching and reverse URL building.
//!
//! ## Route expressions
//!
//! A route is registered from a single expression:
//!
//! ```text
//! GET|POST alias /path/@id:digit/@rest* [ajax]
//! ```
//!
//! - verbs are separated by `|` or `,`; a single word that is not a verb is
//!   an alias for a GET route
//! - the alias is optional and names the route for [`Router::build_url`]
//! - the path is optional when the alias is already registered, in which
//!   case the alias's path is reused
//! - `[mode]` restricts the route to `ajax`, `sync` or `cli` requests
//!
//! ## Path templates
//!
//! | segment         | matches                                         |
//! |-----------------|-------------------------------------------------|
//! | `blog`          | the literal text, case-sensitive                |
//! | `@slug`         | any non-empty segment                           |
//! | `@id:digit`     | a segment passing the named constraint          |
//! | `@rest*`        | one or more trailing segments, bound as a list  |
//!
//! Constraints are `digit` (alias `int`), `alpha`, `alnum`, `word`, `lower`
//! and `upper`. Values are percent-decoded before the constraint is checked.
//!
//! ## Resolution order
//!
//! When several routes match, the winner has the highest priority, then the
//! most literal segments, then the fewest dynamic segments, then the
//! earliest registration. HEAD requests are served by GET routes.
//!
//! ## Example
//!
//! ```rust
//! use stick_dispatch::router::{RouteOptions, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router
//!     .add_route("GET post /posts/@id:digit", "Post->show", RouteOptions::default())
//!     .unwrap();
//!
//! let found = router.resolve("/posts/7", &Method::GET).unwrap();
//! assert_eq!(found.param("id").and_then(|v| v.as_str()), Some("7"));
//!
//! let url = router
//!     .build_url("post", &[("id".to_string(), serde_json::json!(7))])
//!     .unwrap();
//! assert_eq!(url, "/posts/7");
//! ```

mod core;
pub mod pattern;

pub use self::core::{
    ParamValue, ParamVec, Route, RouteCheck, RouteMatch, RouteOptions, Router, MAX_INLINE_PARAMS,
};
pub use pattern::{Constraint, MethodVec, PathTemplate, RoutePattern, Segment};
