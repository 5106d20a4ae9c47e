//! Role markers and host navigation targets

/// Role string that grants access to admin routes.
pub const ADMIN_ROLE: &str = "ROLE_ADMIN";

/// Login entry point the host sends users to when a session is required.
pub const LOGIN_ROUTE: &str = "/login";

/// Query parameter carrying the originally requested location.
pub const REDIRECT_PARAM: &str = "redirect";

/// Landing route for users bounced off a page they cannot use.
pub const HOME_ROUTE: &str = "/";
