use std::{
    borrow::Cow,
    fmt,
    future::Future,
    pin::Pin,
};

/// One value of a directory attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// The value as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(text) => Some(Cow::Borrowed(text)),
            Self::Binary(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Read access to one directory server.
pub trait DirectoryClient: Send + Sync {
    /// The values of `attribute` on the object at `dn`.
    ///
    /// A missing object or attribute, an unreachable server and a timeout
    /// all yield `None`. Implementations never fail otherwise.
    fn query_attribute<'a>(
        &'a self,
        dn: &'a str,
        attribute: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Vec<AttributeValue>>> + Send + 'a>>;
}
