//! Session support for Spindle controllers.
//!
//! [`SessionLayer`] is a middleware that reads the session id of each
//! request, loads the stored data as a read-only [`Session`] snapshot on the
//! request, and exposes a mutable [`SessionHandle`] on the response. Once
//! the response is finished, changes made through the handle are written
//! back to the [`SessionStorage`].
//!
//! # Examples
//!
//! ```
//! use spindle_core::*;
//! use spindle_session::*;
//! use std::sync::Arc;
//!
//! struct Profile;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::new());
//! registry
//!     .action::<Profile>("visit")
//!     .with_verbs("get")
//!     .with_path("/visit")
//!     .param(0, session("visits"))
//!     .param(1, session_handle())
//!     .handler(|_: Arc<Profile>, args: Args| async move {
//!         let visits = args.arg::<Option<u64>>(0)?.unwrap_or(0) + 1;
//!         let handle = args.downcast::<SessionHandle>(1)?;
//!         handle.set("visits", visits).map_err(|e| HttpError::internal().with_message(e.to_string()))?;
//!         Ok::<_, HttpError>(Json(visits))
//!     });
//! registry.controller::<Profile>();
//!
//! let mut server = HttpServer::with_registry(registry, ServerConfig::default());
//! server
//!     .use_middleware(SessionLayer::new(SessionIdSource::bearer(), InMemorySessionStorage::new()))
//!     .unwrap();
//! server.register_controller_instance("/", Arc::new(Profile)).unwrap();
//!
//! for expected in 1..=2 {
//!     let req = HttpRequest::new("GET", "/visit").with_header("Authorization", "Bearer abc");
//!     let (response, completion) = server.respond(req).await;
//!     assert_eq!(response.json::<u64>().unwrap(), expected);
//!     // Persist before the next visit.
//!     completion.run().await;
//! }
//! # });
//! ```

pub mod data;
pub mod error;
pub mod layer;
pub mod params;
pub mod source;
pub mod storage;

pub use data::SessionData;
pub use error::{SessionError, SessionResult};
pub use layer::{RequestSessionExt, ResponseSessionExt, Session, SessionHandle, SessionLayer};
pub use params::{SESSION_PARAM, session, session_all, session_handle};
pub use source::SessionIdSource;
pub use storage::{InMemorySessionStorage, SessionStorage};
