use axum::http::Method;

/// Which configured budget an operation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    Default,
    Auth,
    Chat,
}

/// Every routed action the service exposes. The gate decides on these, not
/// on raw paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    Version,
    Login,
    Register,
    RefreshSession,
    Logout,
    CurrentUser,
    UpdateTimezone,
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    Chat,
}

impl Operation {
    /// Maps a method and matched route template to its operation. `HEAD` is
    /// served by `GET` handlers, so it classifies the same way.
    pub fn classify(method: &Method, route: &str) -> Option<Self> {
        use Operation::*;

        let method = if *method == Method::HEAD { "GET" } else { method.as_str() };
        let op = match (method, route) {
            ("GET", "/health") => Health,
            ("GET", "/version") => Version,
            ("POST", "/login") => Login,
            ("POST", "/register") => Register,
            ("POST", "/auth/refresh") => RefreshSession,
            ("GET" | "POST", "/logout") => Logout,
            ("GET", "/api/user") => CurrentUser,
            ("PUT", "/api/user/timezone") => UpdateTimezone,
            ("GET", "/api/events") => ListEvents,
            ("POST", "/api/events") => CreateEvent,
            ("PUT", "/api/events/:id") => UpdateEvent,
            ("DELETE", "/api/events/:id") => DeleteEvent,
            ("POST", "/ai") => Chat,
            _ => return None,
        };
        Some(op)
    }

    pub fn requires_auth(self) -> bool {
        use Operation::*;
        matches!(
            self,
            CurrentUser | UpdateTimezone | ListEvents | CreateEvent | UpdateEvent | DeleteEvent | Chat
        )
    }

    pub fn limit_class(self) -> Option<LimitClass> {
        use Operation::*;
        match self {
            Health | Version | Logout => None,
            Login | Register | RefreshSession => Some(LimitClass::Auth),
            Chat => Some(LimitClass::Chat),
            CurrentUser | UpdateTimezone | ListEvents | CreateEvent | UpdateEvent | DeleteEvent => {
                Some(LimitClass::Default)
            }
        }
    }

    pub fn name(self) -> &'static str {
        use Operation::*;
        match self {
            Health => "health",
            Version => "version",
            Login => "login",
            Register => "register",
            RefreshSession => "refresh_session",
            Logout => "logout",
            CurrentUser => "current_user",
            UpdateTimezone => "update_timezone",
            ListEvents => "list_events",
            CreateEvent => "create_event",
            UpdateEvent => "update_event",
            DeleteEvent => "delete_event",
            Chat => "chat",
        }
    }
}
