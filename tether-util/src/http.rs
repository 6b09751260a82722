pub use uri::{InvalidUriError, Uri};

mod uri {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub struct InvalidUriError(String);

    impl InvalidUriError {
        pub fn reason(&self) -> &str {
            self.0.as_str()
        }
    }

    impl Display for InvalidUriError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl From<http::uri::InvalidUri> for InvalidUriError {
        fn from(value: http::uri::InvalidUri) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    impl From<http::uri::InvalidUriParts> for InvalidUriError {
        fn from(value: http::uri::InvalidUriParts) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    /// An absolute endpoint URI, e.g. the provisioning service global
    /// endpoint
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct Uri(http::Uri);

    impl Uri {
        pub fn new(uri: http::Uri) -> Self {
            Self(uri)
        }

        pub fn from_static(src: &'static str) -> Self {
            Self(http::Uri::from_static(src))
        }

        /// Replace the path and query of `base_uri`.
        ///
        /// Any path already present on the base is dropped.
        pub fn from_parts(
            base_uri: Uri,
            path: &str,
            query: Option<&str>,
        ) -> Result<Self, InvalidUriError> {
            let path_and_query = if let Some(qs) = query {
                http::uri::PathAndQuery::from_maybe_shared(format!("{path}?{qs}"))?
            } else {
                http::uri::PathAndQuery::from_str(path)?
            };
            let mut parts = base_uri.0.into_parts();
            parts.path_and_query = Some(path_and_query);

            Ok(http::Uri::from_parts(parts).map(Self::new)?)
        }
    }

    impl Display for Uri {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl FromStr for Uri {
        type Err = InvalidUriError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let uri = http::Uri::from_str(s)?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(InvalidUriError(format!(
                    "expected an absolute URI, got '{s}'"
                )));
            }
            Ok(Self::new(uri))
        }
    }

    impl TryFrom<String> for Uri {
        type Error = InvalidUriError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            value.parse()
        }
    }

    impl From<http::Uri> for Uri {
        fn from(value: http::Uri) -> Self {
            Self(value)
        }
    }

    impl From<Uri> for http::Uri {
        fn from(value: Uri) -> Self {
            value.0
        }
    }

    impl Serialize for Uri {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl<'de> Deserialize<'de> for Uri {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn it_replaces_the_path_and_query() {
            let base: Uri = "https://global.example.net/ignored".parse().unwrap();
            let uri = Uri::from_parts(
                base,
                "/0ne00000001/registrations/dev1/register",
                Some("api-version=2019-03-31"),
            )
            .unwrap();
            assert_eq!(
                uri.to_string(),
                "https://global.example.net/0ne00000001/registrations/dev1/register?api-version=2019-03-31"
            );
        }

        #[test]
        fn it_rejects_relative_uris() {
            assert!("/just/a/path".parse::<Uri>().is_err());
            assert!("not a uri".parse::<Uri>().is_err());
        }

        #[test]
        fn it_serializes_as_a_string() {
            let uri = Uri::from_static("https://global.example.net/");
            let value = serde_json::to_value(&uri).unwrap();
            assert_eq!(value, serde_json::json!("https://global.example.net/"));

            let back: Uri = serde_json::from_value(value).unwrap();
            assert_eq!(back, uri);
        }
    }
}
