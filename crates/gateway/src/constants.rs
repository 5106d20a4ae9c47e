//! API endpoint paths and gateway timing defaults

use std::time::Duration;

/// Credential login; answered with an access token and the user.
pub const LOGIN_PATH: &str = "/auth/login";

/// Account creation; same response shape as login.
pub const REGISTER_PATH: &str = "/auth/register";

/// Access token refresh. Authenticated by the HttpOnly refresh cookie only.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Server-side session teardown (revokes the refresh cookie).
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Current user for the presented access token.
pub const CURRENT_USER_PATH: &str = "/auth/me";

/// Transport timeout applied to every request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a request queued behind an in-flight refresh waits for it to settle.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(30);
