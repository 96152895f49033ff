use crate::DecodeError;
use crate::Error;
use crate::KvConfig;
use crate::Result;

/// Wildcard matching exactly one subject token
pub const SINGLE_TOKEN_WILDCARD: &str = "*";
/// Wildcard matching one or more trailing tokens
pub const TAIL_WILDCARD: &str = ">";

/// Stream and subject names for one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvNaming {
    bucket: String,
    stream_name: String,
    /// `"{subject_prefix}.{bucket}."`, the prefix every key subject starts with
    key_prefix: String,
}

impl KvNaming {
    /// # Errors
    /// - [`Error::InvalidArgument`] if `bucket` is not `[A-Za-z0-9_-]+`
    pub fn new(
        bucket: &str,
        config: &KvConfig,
    ) -> Result<Self> {
        validate_bucket(bucket)?;
        Ok(Self {
            bucket: bucket.to_string(),
            stream_name: format!("{}{}", config.stream_prefix, bucket),
            key_prefix: format!("{}.{}.", config.subject_prefix, bucket),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Maps a key pattern to the subject a consumer filters on.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if the pattern is not a valid key pattern
    pub fn to_read_subject(
        &self,
        key_pattern: &str,
    ) -> Result<String> {
        validate_key_pattern(key_pattern)?;
        Ok(format!("{}{}", self.key_prefix, key_pattern))
    }

    /// Recovers the key from a delivered message subject.
    pub fn key_from_subject<'a>(
        &self,
        subject: &'a str,
    ) -> std::result::Result<&'a str, DecodeError> {
        match subject.strip_prefix(self.key_prefix.as_str()) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(DecodeError::UnexpectedSubject {
                subject: subject.to_string(),
                prefix: self.key_prefix.clone(),
            }),
        }
    }
}

pub(crate) fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::InvalidArgument("bucket name must not be empty".into()));
    }
    if !bucket.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::InvalidArgument(format!(
            "bucket name {bucket:?} may only contain [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Key tokens are dot separated; `*` may stand for a whole token and `>`
/// only for the last one.
pub(crate) fn validate_key_pattern(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key pattern must not be empty".into()));
    }
    if key.starts_with('.') || key.ends_with('.') {
        return Err(Error::InvalidArgument(format!(
            "key pattern {key:?} must not start or end with '.'"
        )));
    }

    let tokens: Vec<&str> = key.split('.').collect();
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "" => {
                return Err(Error::InvalidArgument(format!(
                    "key pattern {key:?} contains an empty token"
                )));
            }
            SINGLE_TOKEN_WILDCARD => {}
            TAIL_WILDCARD if i == last => {}
            TAIL_WILDCARD => {
                return Err(Error::InvalidArgument(format!(
                    "key pattern {key:?}: '>' is only allowed as the last token"
                )));
            }
            literal => {
                if !literal.chars().all(is_key_char) {
                    return Err(Error::InvalidArgument(format!(
                        "key pattern {key:?} contains invalid characters"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '=')
}
