//! Parameter resolvers and their declarations.
//!
//! A declaration is attached to one parameter index of one controller
//! method. Declarations of the same index form a chain: the first resolver
//! receives the seed value, every later one receives the output of its
//! predecessor.
//!
//! Four declaration forms exist, normalized into a plain [`ResolverFn`]
//! when the method is compiled:
//!
//! - **Function**: a closure used as-is.
//! - **Class**: a [`ParamResolver`] type, instantiated at compile time.
//! - **Factory**: called once with a [`FactoryContext`] to build the
//!   resolver for that parameter.
//! - **Instance**: an existing [`ParamResolver`] value, reused.

use crate::error::BoxError;
use crate::{Extensions, HttpRequest, ParamValue, ResponseWriter};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Context shared by every resolver of one invocation.
///
/// HTTP dispatch fills `request` and `response`; RPC calls fill `payload`.
/// Cloning is cheap.
#[derive(Clone, Default)]
pub struct ResolveData {
    inner: Arc<ResolveDataInner>,
}

#[derive(Clone, Default)]
struct ResolveDataInner {
    request: Option<HttpRequest>,
    response: Option<ResponseWriter>,
    payload: Option<serde_json::Value>,
    extensions: Extensions,
}

impl ResolveData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_request(request: HttpRequest, response: ResponseWriter) -> Self {
        Self {
            inner: Arc::new(ResolveDataInner {
                request: Some(request),
                response: Some(response),
                ..Default::default()
            }),
        }
    }

    pub fn for_payload(payload: serde_json::Value) -> Self {
        Self::new().with_payload(payload)
    }

    pub fn with_request(mut self, request: HttpRequest) -> Self {
        Arc::make_mut(&mut self.inner).request = Some(request);
        self
    }

    pub fn with_response(mut self, response: ResponseWriter) -> Self {
        Arc::make_mut(&mut self.inner).response = Some(response);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        Arc::make_mut(&mut self.inner).payload = Some(payload);
        self
    }

    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.inner).extensions.insert(value);
        self
    }

    pub fn request(&self) -> Option<&HttpRequest> {
        self.inner.request.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseWriter> {
        self.inner.response.as_ref()
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.inner.payload.as_ref()
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.extensions.get::<T>()
    }
}

impl fmt::Debug for ResolveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveData")
            .field("request", &self.request().map(|r| format!("{} {}", r.method, r.url)))
            .field("payload", &self.inner.payload)
            .finish()
    }
}

/// Output of a resolver step: either available now or still pending.
pub enum Resolved {
    Ready(Result<ParamValue, BoxError>),
    Pending(BoxFuture<'static, Result<ParamValue, BoxError>>),
}

impl Resolved {
    pub fn ready(value: impl Into<ParamValue>) -> Self {
        Resolved::Ready(Ok(value.into()))
    }

    pub fn error(error: impl Into<BoxError>) -> Self {
        Resolved::Ready(Err(error.into()))
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<ParamValue, BoxError>> + Send + 'static,
    {
        Resolved::Pending(Box::pin(future))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Resolved::Pending(_))
    }

    /// Wait for the value.
    pub async fn resolve(self) -> Result<ParamValue, BoxError> {
        match self {
            Resolved::Ready(result) => result,
            Resolved::Pending(future) => future.await,
        }
    }
}

impl From<Result<ParamValue, BoxError>> for Resolved {
    fn from(result: Result<ParamValue, BoxError>) -> Self {
        Resolved::Ready(result)
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Resolved::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Normalized resolver step.
pub type ResolverFn = Arc<dyn Fn(&ResolveData, ParamValue) -> Resolved + Send + Sync>;

/// A resolver implemented as a type.
pub trait ParamResolver: Send + Sync + 'static {
    fn resolve_param(&self, data: &ResolveData, previous: ParamValue) -> Resolved;
}

/// Where a factory-built resolver will be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryContext {
    pub controller: &'static str,
    pub method: String,
    pub index: usize,
}

type ClassCtor = Arc<dyn Fn() -> Arc<dyn ParamResolver> + Send + Sync>;
type ResolverFactory = Arc<dyn Fn(&FactoryContext) -> Result<ResolverFn, BoxError> + Send + Sync>;

/// The form a declaration was given in.
#[derive(Clone)]
pub enum DeclarationKind {
    Function(ResolverFn),
    Class(ClassCtor),
    Factory(ResolverFactory),
    Instance(Arc<dyn ParamResolver>),
}

impl DeclarationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Function(_) => "function",
            DeclarationKind::Class(_) => "class",
            DeclarationKind::Factory(_) => "factory",
            DeclarationKind::Instance(_) => "instance",
        }
    }
}

/// One resolver declaration for a (method, index) pair.
#[derive(Clone)]
pub struct ParamDeclaration {
    name: Cow<'static, str>,
    kind: DeclarationKind,
}

impl ParamDeclaration {
    pub fn function<F>(name: impl Into<Cow<'static, str>>, resolver: F) -> Self
    where
        F: Fn(&ResolveData, ParamValue) -> Resolved + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: DeclarationKind::Function(Arc::new(resolver)),
        }
    }

    /// Declare a resolver type, constructed with `Default` at compile time.
    pub fn class<R: ParamResolver + Default>(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            kind: DeclarationKind::Class(Arc::new(|| Arc::new(R::default()) as Arc<dyn ParamResolver>)),
        }
    }

    pub fn factory<F>(name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn(&FactoryContext) -> Result<ResolverFn, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: DeclarationKind::Factory(Arc::new(factory)),
        }
    }

    pub fn instance<R: ParamResolver>(name: impl Into<Cow<'static, str>>, resolver: R) -> Self {
        Self {
            name: name.into(),
            kind: DeclarationKind::Instance(Arc::new(resolver)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DeclarationKind {
        &self.kind
    }

    /// Turn the declaration into a plain resolver function.
    pub(crate) fn normalize(&self, context: &FactoryContext) -> Result<ResolverFn, BoxError> {
        match &self.kind {
            DeclarationKind::Function(resolver) => Ok(resolver.clone()),
            DeclarationKind::Class(ctor) => Ok(resolver_from(ctor())),
            DeclarationKind::Instance(instance) => Ok(resolver_from(instance.clone())),
            DeclarationKind::Factory(factory) => factory(context),
        }
    }
}

fn resolver_from(resolver: Arc<dyn ParamResolver>) -> ResolverFn {
    Arc::new(move |data: &ResolveData, previous: ParamValue| {
        resolver.resolve_param(data, previous)
    })
}

impl fmt::Debug for ParamDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDeclaration")
            .field("name", &self.name)
            .field("kind", &self.kind.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Upper;

    impl ParamResolver for Upper {
        fn resolve_param(&self, _data: &ResolveData, previous: ParamValue) -> Resolved {
            let text = previous.as_str().unwrap_or_default().to_uppercase();
            Resolved::ready(text)
        }
    }

    fn context() -> FactoryContext {
        FactoryContext {
            controller: "Test",
            method: "index".to_string(),
            index: 0,
        }
    }

    #[tokio::test]
    async fn test_class_and_instance_normalize() {
        let data = ResolveData::new();
        for decl in [
            ParamDeclaration::class::<Upper>("upper"),
            ParamDeclaration::instance("upper", Upper),
        ] {
            let resolver = decl.normalize(&context()).unwrap();
            let value = resolver(&data, "abc".into()).resolve().await.unwrap();
            assert_eq!(value.as_str(), Some("ABC"));
        }
    }

    #[tokio::test]
    async fn test_factory_receives_context() {
        let decl = ParamDeclaration::factory("named", |ctx| {
            let label = format!("{}.{}:{}", ctx.controller, ctx.method, ctx.index);
            Ok(Arc::new(move |_: &ResolveData, _: ParamValue| {
                Resolved::ready(label.clone())
            }) as ResolverFn)
        });
        let resolver = decl.normalize(&context()).unwrap();
        let value = resolver(&ResolveData::new(), ParamValue::Undefined)
            .resolve()
            .await
            .unwrap();
        assert_eq!(value.as_str(), Some("Test.index:0"));
    }

    #[tokio::test]
    async fn test_pending_resolves() {
        let step = Resolved::pending(async { Ok(ParamValue::from(1i64)) });
        assert!(step.is_pending());
        assert_eq!(step.resolve().await.unwrap().as_json(), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_resolve_data_builders() {
        let data = ResolveData::for_payload(serde_json::json!({"a": 1})).with_extension(7u8);
        assert_eq!(data.payload(), Some(&serde_json::json!({"a": 1})));
        assert_eq!(data.extension::<u8>(), Some(&7));
        assert!(data.request().is_none());
    }
}
