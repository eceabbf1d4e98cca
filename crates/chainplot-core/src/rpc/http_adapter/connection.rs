use std::path::Path;

use reqwest::Url;

use crate::error::CoreError;

/// Basic-auth pair sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Credentials {
    pub(super) user: String,
    pub(super) pass: String,
}

impl Credentials {
    fn new(user: &str, pass: &str) -> Self {
        Self {
            user: user.to_owned(),
            pass: pass.to_owned(),
        }
    }

    /// Read the node's `.cookie` file: a single `user:password` line.
    pub(super) fn from_cookie_file(path: &Path) -> Result<Self, CoreError> {
        let invalid = |reason: String| {
            CoreError::InvalidConfig(format!("rpc cookie file {}: {reason}", path.display()))
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        content
            .lines()
            .next()
            .and_then(|line| line.trim().split_once(':'))
            .filter(|(user, pass)| !user.is_empty() && !pass.is_empty())
            .map(|(user, pass)| Self::new(user, pass))
            .ok_or_else(|| invalid("expected `user:password` on the first line".to_owned()))
    }
}

/// Where to reach the node, with any `user:pass@` moved out of the URL.
#[derive(Debug)]
pub(super) struct Endpoint {
    pub(super) url: Url,
    pub(super) embedded: Option<Credentials>,
}

impl Endpoint {
    pub(super) fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut url = Url::parse(raw)
            .map_err(|e| CoreError::InvalidConfig(format!("invalid rpc url `{raw}`: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig(format!(
                "rpc url `{raw}` must use http or https"
            )));
        }

        let embedded = url
            .password()
            .filter(|_| !url.username().is_empty())
            .map(|pass| Credentials::new(url.username(), pass));
        if embedded.is_some() {
            // Only cannot-be-a-base URLs reject these; http(s) never is one.
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }
        Ok(Self { url, embedded })
    }

    /// Credentials for this endpoint, in precedence order: the explicit
    /// `user`/`pass` pair, then credentials from the URL, then the cookie
    /// file. Giving only one of `user` and `pass` is an error.
    pub(super) fn credentials(
        &self,
        user: Option<&str>,
        pass: Option<&str>,
        cookie_file: Option<&Path>,
    ) -> Result<Option<Credentials>, CoreError> {
        match (user, pass) {
            (Some(user), Some(pass)) => Ok(Some(Credentials::new(user, pass))),
            (Some(_), None) | (None, Some(_)) => Err(CoreError::InvalidConfig(
                "--rpc-user and --rpc-pass must be given together".to_owned(),
            )),
            (None, None) => match (&self.embedded, cookie_file) {
                (Some(embedded), _) => Ok(Some(embedded.clone())),
                (None, Some(path)) => Credentials::from_cookie_file(path).map(Some),
                (None, None) => Ok(None),
            },
        }
    }
}
