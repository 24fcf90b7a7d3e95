//! Cookies a render wants to set or delete.
//!
//! Templates only record intents; the serving layer turns each entry into
//! one `Set-Cookie` header after a successful render.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `Expires` value that makes a browser drop the cookie immediately.
const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    #[serde(alias = "strict")]
    Strict,
    #[serde(alias = "lax")]
    Lax,
    #[serde(alias = "none")]
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Options passed to `jshp.setCookie()` / `jshp.deleteCookie()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CookieOptions {
    pub value: String,
    pub max_age: Option<i64>,
    pub expires: Option<String>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

/// A cookie to create on the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCookie {
    pub key: String,
    pub value: String,
    pub max_age: Option<i64>,
    pub expires: Option<String>,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl NewCookie {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_options(
            key,
            CookieOptions {
                value: value.into(),
                ..CookieOptions::default()
            },
        )
    }

    pub fn from_options(key: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            key: key.into(),
            value: options.value,
            max_age: options.max_age,
            expires: options.expires,
            path: options.path.unwrap_or_else(|| String::from("/")),
            domain: options.domain,
            secure: options.secure,
            http_only: options.http_only,
            same_site: options.same_site,
        }
    }

    /// Value of the `Set-Cookie` header for this cookie.
    pub fn to_header(&self) -> String {
        let mut header = format!("{}={}", self.key, self.value);
        if let Some(domain) = &self.domain {
            let _ = write!(header, "; Domain={domain}");
        }
        if let Some(expires) = &self.expires {
            let _ = write!(header, "; Expires={expires}");
        }
        if let Some(max_age) = self.max_age {
            let _ = write!(header, "; Max-Age={max_age}");
        }
        push_flags(&mut header, self.secure, self.http_only, &self.path, self.same_site);
        header
    }
}

/// A cookie to remove from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteCookie {
    pub key: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl DeleteCookie {
    pub fn new(key: impl Into<String>) -> Self {
        Self::from_options(key, CookieOptions::default())
    }

    /// Only the attributes that identify the cookie are kept; value, expiry
    /// and max-age are forced by the deletion itself.
    pub fn from_options(key: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            key: key.into(),
            path: options.path.unwrap_or_else(|| String::from("/")),
            domain: options.domain,
            secure: options.secure,
            http_only: options.http_only,
            same_site: options.same_site,
        }
    }

    /// Value of the `Set-Cookie` header that expires this cookie.
    pub fn to_header(&self) -> String {
        let mut header = format!("{}=", self.key);
        if let Some(domain) = &self.domain {
            let _ = write!(header, "; Domain={domain}");
        }
        let _ = write!(header, "; Expires={EXPIRED}; Max-Age=0");
        push_flags(&mut header, self.secure, self.http_only, &self.path, self.same_site);
        header
    }
}

fn push_flags(header: &mut String, secure: bool, http_only: bool, path: &str, same_site: Option<SameSite>) {
    if secure {
        header.push_str("; Secure");
    }
    if http_only {
        header.push_str("; HttpOnly");
    }
    let _ = write!(header, "; Path={path}");
    if let Some(same_site) = same_site {
        let _ = write!(header, "; SameSite={}", same_site.as_str());
    }
}

/// Check that a cookie fits on a single `Set-Cookie` header line.
///
/// The name must be a plain token. The value and attributes may not contain
/// control characters or `;`, which would start a new header or attribute.
pub fn check_cookie(key: &str, options: &CookieOptions) -> Result<()> {
    let invalid = |reason: String| Error::InvalidCookie {
        key: key.to_owned(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid(String::from("name is empty")));
    }
    if let Some(c) = key
        .chars()
        .find(|&c| c.is_control() || c.is_whitespace() || matches!(c, ';' | ',' | '='))
    {
        return Err(invalid(format!("name contains {c:?}")));
    }

    let attributes = [
        ("value", Some(options.value.as_str())),
        ("expires", options.expires.as_deref()),
        ("path", options.path.as_deref()),
        ("domain", options.domain.as_deref()),
    ];
    for (name, text) in attributes {
        if let Some(c) = text.and_then(|text| text.chars().find(|&c| c.is_control() || c == ';')) {
            return Err(invalid(format!("{name} contains {c:?}")));
        }
    }

    Ok(())
}
