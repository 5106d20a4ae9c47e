//! `AuthBackend` over the gateway
//!
//! Login and registration bypass the refresh protocol: a 401 there is a
//! credential rejection, not an expired token. Restore joins the shared
//! refresh so a startup restore and a request-time refresh never race.

use std::future::Future;
use std::pin::Pin;

use serde_json::json;
use session::{AuthBackend, AuthGrant, Credentials, Identity, Registration};

use crate::client::Gateway;
use crate::constants::{CURRENT_USER_PATH, LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH};
use crate::error::Error;
use crate::request::ApiRequest;

type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = session::Result<T>> + Send + 'a>>;

impl Gateway {
    async fn exchange(&self, request: ApiRequest) -> Result<AuthGrant, Error> {
        let response = self.send_public(&request).await?;
        response
            .json::<AuthGrant>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("invalid auth response: {e}")))
    }
}

impl AuthBackend for Gateway {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, AuthGrant> {
        Box::pin(async move {
            let request = ApiRequest::post(LOGIN_PATH).with_body(json!({
                "email": credentials.email,
                "password": credentials.password.expose(),
            }));
            Ok(self.exchange(request).await?)
        })
    }

    fn register<'a>(&'a self, registration: &'a Registration) -> BackendFuture<'a, AuthGrant> {
        Box::pin(async move {
            let request = ApiRequest::post(REGISTER_PATH).with_body(json!({
                "name": registration.name,
                "email": registration.email,
                "password": registration.password.expose(),
            }));
            Ok(self.exchange(request).await?)
        })
    }

    fn restore(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move { Ok(self.refresh_session().await?) })
    }

    fn current_user(&self) -> BackendFuture<'_, Identity> {
        Box::pin(async move { Ok(self.get::<Identity>(CURRENT_USER_PATH).await?) })
    }

    fn logout(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.send_once(&ApiRequest::post(LOGOUT_PATH)).await?;
            Ok(())
        })
    }
}
