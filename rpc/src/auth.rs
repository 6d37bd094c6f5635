//! HTTP Basic auth against two configured credential pairs (admin, limited),
//! with constant-time comparison so failed-auth timing can't be used to
//! probe the password (spec §4.7).
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Limited,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub admin: Credentials,
    pub limited: Option<Credentials>,
}

impl AuthConfig {
    /// Parses the decoded `user:pass` string from a `Basic` header and
    /// resolves which role, if any, it authenticates as.
    pub fn authenticate(&self, decoded: &str) -> Option<Role> {
        let (user, pass) = decoded.split_once(':')?;
        if credentials_match(&self.admin, user, pass) {
            return Some(Role::Admin);
        }
        if let Some(limited) = &self.limited {
            if credentials_match(limited, user, pass) {
                return Some(Role::Limited);
            }
        }
        None
    }
}

fn credentials_match(expected: &Credentials, user: &str, pass: &str) -> bool {
    let user_ok: bool = expected.username.as_bytes().ct_eq(user.as_bytes()).into();
    let pass_ok: bool = expected.password.as_bytes().ct_eq(pass.as_bytes()).into();
    user_ok & pass_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            admin: Credentials { username: "admin".into(), password: "hunter2".into() },
            limited: Some(Credentials { username: "readonly".into(), password: "peek".into() }),
        }
    }

    #[test]
    fn admin_credentials_authenticate_as_admin() {
        assert_eq!(config().authenticate("admin:hunter2"), Some(Role::Admin));
    }

    #[test]
    fn limited_credentials_authenticate_as_limited() {
        assert_eq!(config().authenticate("readonly:peek"), Some(Role::Limited));
    }

    #[test]
    fn wrong_password_is_rejected() {
        assert_eq!(config().authenticate("admin:wrong"), None);
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert_eq!(config().authenticate("no-colon-here"), None);
    }
}
