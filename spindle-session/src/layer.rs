//! Session middleware.

use crate::data::SessionData;
use crate::error::SessionResult;
use crate::source::SessionIdSource;
use crate::storage::SessionStorage;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use spindle_core::{HttpError, HttpRequest, Middleware, Next, ResponseWriter};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Session data as loaded at the start of the request. Read-only.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    data: Arc<Value>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Mutable session of the response. Changes are persisted once the
/// response is finished.
#[derive(Debug)]
pub struct SessionHandle {
    id: Mutex<String>,
    data: Mutex<SessionData>,
}

impl SessionHandle {
    fn new(id: String, data: SessionData) -> Self {
        Self {
            id: Mutex::new(id),
            data: Mutex::new(data),
        }
    }

    /// Current session id; empty when the request had none and no id was
    /// assigned yet.
    pub fn id(&self) -> String {
        self.id.lock().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *self.id.lock() = id.into();
    }

    /// Assign a fresh random id and return it.
    pub fn regenerate(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.set_id(id.clone());
        id
    }

    pub fn data(&self) -> SessionData {
        self.data.lock().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> SessionResult<()> {
        self.data.lock().set(key, value)?;
        Ok(())
    }

    /// Run `f` with mutable access to the data.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.data.lock())
    }
}

/// Session access on requests.
pub trait RequestSessionExt {
    fn session(&self) -> Option<&Session>;

    fn session_id(&self) -> Option<&str> {
        self.session().map(Session::id)
    }
}

impl RequestSessionExt for HttpRequest {
    fn session(&self) -> Option<&Session> {
        self.extensions.get::<Session>()
    }
}

/// Session access on responses.
pub trait ResponseSessionExt {
    fn session(&self) -> Option<Arc<SessionHandle>>;
}

impl ResponseSessionExt for ResponseWriter {
    fn session(&self) -> Option<Arc<SessionHandle>> {
        self.extension::<SessionHandle>()
    }
}

/// Loads the session before routing and persists it after the response.
///
/// Requests without a session id get an empty [`SessionHandle`] and no
/// [`Session`]; storage is only touched if a handler assigns an id.
///
/// ```
/// use spindle_core::{HttpServer, ServerConfig};
/// use spindle_session::{InMemorySessionStorage, SessionIdSource, SessionLayer};
///
/// let mut server = HttpServer::new(ServerConfig::default());
/// server
///     .use_middleware(SessionLayer::new(SessionIdSource::bearer(), InMemorySessionStorage::new()))
///     .unwrap();
/// ```
pub struct SessionLayer<S> {
    source: SessionIdSource,
    storage: Arc<S>,
}

impl<S: SessionStorage + 'static> SessionLayer<S> {
    pub fn new(source: SessionIdSource, storage: S) -> Self {
        Self::with_storage(source, Arc::new(storage))
    }

    /// Use storage shared with other parts of the application.
    pub fn with_storage(source: SessionIdSource, storage: Arc<S>) -> Self {
        Self { source, storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn source(&self) -> &SessionIdSource {
        &self.source
    }
}

#[async_trait]
impl<S: SessionStorage + 'static> Middleware for SessionLayer<S> {
    async fn handle(&self, mut req: HttpRequest, res: ResponseWriter, next: Next) -> Result<(), HttpError> {
        let request_id = self.source.extract(&req);

        let snapshot = match &request_id {
            Some(id) => {
                let stored = self.storage.get(id).await.map_err(|e| {
                    error!(error = %e, "Failed to load session");
                    HttpError::internal().with_message(format!("Failed to load session: {}", e))
                })?;
                let snapshot = Arc::new(stored);
                req.extensions.insert(Session {
                    id: id.clone(),
                    data: snapshot.clone(),
                });
                Some(snapshot)
            }
            None => {
                trace!(path = %req.path, "Request carries no session id");
                None
            }
        };

        let initial = snapshot
            .as_deref()
            .map(SessionData::from_value)
            .unwrap_or_default();
        let handle = Arc::new(SessionHandle::new(request_id.clone().unwrap_or_default(), initial));
        res.insert_extension_arc(handle.clone());

        if let SessionIdSource::Cookie { name, options } = &self.source {
            let name = name.clone();
            let options = options.clone();
            let original = request_id.clone().unwrap_or_default();
            let handle = handle.clone();
            res.on_headers(move |res| {
                let current = handle.id();
                if current != original {
                    res.cookie(&name, &current, &options);
                }
            });
        }

        let storage = self.storage.clone();
        res.on_finish(move |_response| async move {
            persist(storage.as_ref(), &handle, request_id, snapshot).await;
        });

        next(req).await
    }
}

async fn persist<S: SessionStorage>(
    storage: &S,
    handle: &SessionHandle,
    request_id: Option<String>,
    snapshot: Option<Arc<Value>>,
) {
    let id = handle.id();
    if id.is_empty() {
        return;
    }

    let data = handle.data().data();
    let previous = match (request_id, snapshot) {
        (Some(original), Some(snapshot)) if original == id => {
            if *snapshot == data {
                trace!("Session unchanged");
                return;
            }
            Some((*snapshot).clone())
        }
        _ => None,
    };

    match storage.set(&id, data, previous).await {
        Ok(()) => debug!("Session persisted"),
        Err(e) => error!(error = %e, "Failed to persist session"),
    }
}
