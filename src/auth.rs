/// Basic-auth credentials attached to every GoCD request.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    /// Builds credentials only when a user name is configured.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        username
            .filter(|user| !user.is_empty())
            .map(|user| Self::new(user, password.unwrap_or_default()))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BasicAuth({}:<redacted>)", self.username)
    }
}
