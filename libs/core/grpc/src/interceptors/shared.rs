use std::fmt;
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};

type InterceptFn = dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync;

/// Type-erased, cloneable interceptor.
///
/// Lets a server be built with one concrete interceptor type whether auth is
/// a JWT interceptor, a caller-supplied one, or absent.
#[derive(Clone, Default)]
pub struct SharedInterceptor(Option<Arc<InterceptFn>>);

impl SharedInterceptor {
    pub fn new<I>(interceptor: I) -> Self
    where
        I: Interceptor + Clone + Send + Sync + 'static,
    {
        Self(Some(Arc::new(move |request| {
            interceptor.clone().call(request)
        })))
    }

    /// Interceptor that lets every call through untouched.
    pub fn pass_through() -> Self {
        Self(None)
    }

    pub fn is_pass_through(&self) -> bool {
        self.0.is_none()
    }
}

impl Interceptor for SharedInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        match &self.0 {
            Some(intercept) => intercept(request),
            None => Ok(request),
        }
    }
}

impl fmt::Debug for SharedInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedInterceptor")
            .field(&if self.is_pass_through() { "pass-through" } else { "active" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through() {
        let mut shared = SharedInterceptor::pass_through();
        assert!(shared.is_pass_through());
        assert!(shared.call(Request::new(())).is_ok());
    }

    #[test]
    fn test_wraps_interceptor() {
        let deny = |_: Request<()>| -> Result<Request<()>, Status> {
            Err(Status::permission_denied("nope"))
        };
        let mut shared = SharedInterceptor::new(deny);
        let mut clone = shared.clone();

        assert_eq!(shared.call(Request::new(())).unwrap_err().code(), tonic::Code::PermissionDenied);
        assert_eq!(clone.call(Request::new(())).unwrap_err().code(), tonic::Code::PermissionDenied);
    }
}
