/// Identity Binding
///
/// Looks up the user record for a resolved principal through the host's
/// `UserProvider` and attaches it to the request extensions as a typed
/// `AuthContext<U>`.
use async_trait::async_trait;
use axum::http::Extensions;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use super::error::{AuthError, BoxError};
use super::identity::PrincipalKey;

/// Host-supplied user lookup
#[async_trait]
pub trait UserProvider: Send + Sync + 'static {
    type User: Send + Sync + 'static;

    async fn find_user(&self, key: &PrincipalKey) -> Result<Self::User, BoxError>;
}

/// `UserProvider` backed by an async closure
pub struct FnUserProvider<F, U> {
    f: F,
    _user: PhantomData<fn() -> U>,
}

pub fn provider_fn<F, Fut, U>(f: F) -> FnUserProvider<F, U>
where
    F: Fn(PrincipalKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, BoxError>> + Send,
    U: Send + Sync + 'static,
{
    FnUserProvider {
        f,
        _user: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, U> UserProvider for FnUserProvider<F, U>
where
    F: Fn(PrincipalKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, BoxError>> + Send,
    U: Send + Sync + 'static,
{
    type User = U;

    async fn find_user(&self, key: &PrincipalKey) -> Result<U, BoxError> {
        (self.f)(key.clone()).await
    }
}

/// Identity attached to a request after successful resolution
#[derive(Debug)]
pub struct AuthContext<U> {
    pub principal: PrincipalKey,
    pub user: Arc<U>,
}

impl<U> Clone for AuthContext<U> {
    fn clone(&self) -> Self {
        Self {
            principal: self.principal.clone(),
            user: Arc::clone(&self.user),
        }
    }
}

/// Records that some identity was bound, whatever its record type
#[derive(Debug, Clone)]
pub struct BoundIdentity {
    pub principal: PrincipalKey,
    pub type_name: &'static str,
}

pub struct IdentityBinder<P> {
    provider: Arc<P>,
}

impl<P> Clone for IdentityBinder<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: UserProvider> IdentityBinder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    pub async fn lookup(&self, principal: &PrincipalKey) -> Result<P::User, AuthError> {
        self.provider.find_user(principal).await.map_err(|e| {
            warn!(principal = %principal, "User lookup failed: {}", e);
            AuthError::IdentityLookupFailed(e)
        })
    }

    /// Look up the user and bind it into `extensions`
    pub async fn bind(
        &self,
        extensions: &mut Extensions,
        principal: PrincipalKey,
    ) -> Result<AuthContext<P::User>, AuthError> {
        let user = self.lookup(&principal).await?;
        let context = AuthContext {
            principal: principal.clone(),
            user: Arc::new(user),
        };

        extensions.insert(context.clone());
        extensions.insert(BoundIdentity {
            principal,
            type_name: std::any::type_name::<P::User>(),
        });

        Ok(context)
    }
}

/// Read the bound identity, requiring it to be of record type `T`
pub fn retrieve<T: Send + Sync + 'static>(
    extensions: &Extensions,
) -> Result<AuthContext<T>, AuthError> {
    if let Some(context) = extensions.get::<AuthContext<T>>() {
        return Ok(context.clone());
    }

    match extensions.get::<BoundIdentity>() {
        Some(bound) => Err(AuthError::ContextIdentityTypeMismatch {
            expected: std::any::type_name::<T>(),
            found: bound.type_name,
        }),
        None => Err(AuthError::ContextIdentityAbsent),
    }
}

pub fn retrieve_user<T: Send + Sync + 'static>(extensions: &Extensions) -> Result<Arc<T>, AuthError> {
    retrieve::<T>(extensions).map(|context| context.user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Member {
        id: String,
    }

    #[derive(Debug)]
    struct Admin;

    fn members() -> impl UserProvider<User = Member> {
        provider_fn(|key: PrincipalKey| async move {
            match key.as_str() {
                Some(id) if id.starts_with("u-") => Ok(Member { id: id.to_string() }),
                _ => Err(BoxError::from(format!("no user {}", key))),
            }
        })
    }

    #[tokio::test]
    async fn test_bind_and_retrieve() {
        let binder = IdentityBinder::new(members());
        let mut extensions = Extensions::new();

        let context = binder
            .bind(&mut extensions, PrincipalKey::from("u-42"))
            .await
            .unwrap();
        assert_eq!(context.user.id, "u-42");

        let user = retrieve_user::<Member>(&extensions).unwrap();
        assert_eq!(*user, Member { id: "u-42".to_string() });
        assert_eq!(
            retrieve::<Member>(&extensions).unwrap().principal,
            PrincipalKey::from("u-42")
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_binds_nothing() {
        let binder = IdentityBinder::new(members());
        let mut extensions = Extensions::new();

        let result = binder.bind(&mut extensions, PrincipalKey::Int(1)).await;
        assert!(matches!(result, Err(AuthError::IdentityLookupFailed(_))));
        assert!(matches!(
            retrieve_user::<Member>(&extensions),
            Err(AuthError::ContextIdentityAbsent)
        ));
    }

    #[test]
    fn test_retrieve_absent() {
        let extensions = Extensions::new();
        assert!(matches!(
            retrieve::<Member>(&extensions),
            Err(AuthError::ContextIdentityAbsent)
        ));
    }

    #[tokio::test]
    async fn test_retrieve_wrong_type() {
        let binder = IdentityBinder::new(members());
        let mut extensions = Extensions::new();
        binder
            .bind(&mut extensions, PrincipalKey::from("u-42"))
            .await
            .unwrap();

        match retrieve_user::<Admin>(&extensions) {
            Err(AuthError::ContextIdentityTypeMismatch { expected, found }) => {
                assert!(expected.ends_with("Admin"));
                assert!(found.ends_with("Member"));
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }
}
