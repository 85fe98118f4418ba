use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Ordered list of environment variables used for path expansion.
///
/// Later entries override earlier ones, so merging is plain concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(pub Vec<KeyValue>);

impl Env {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self(std::env::vars().map(KeyValue::from).collect())
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append an entry. A later entry shadows an earlier one with the same key.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Expand `$NAME` and `${NAME}` references in `input`.
    ///
    /// Unknown variables expand to the empty string. A `$` that does not start
    /// a reference is kept as is.
    ///
    /// ```
    /// use runr_model::Env;
    ///
    /// let mut env = Env::new();
    /// env.push("HOME", "/home/runr");
    /// assert_eq!(env.expand("${HOME}/builds/$UNSET"), "/home/runr/builds/");
    /// assert_eq!(env.expand("price: $"), "price: $");
    /// ```
    pub fn expand(&self, input: &str) -> String {
        let bytes = input.as_bytes();
        let mut out = String::with_capacity(input.len());
        let mut i = 0;
        let mut plain = 0;

        while i < bytes.len() {
            if bytes[i] != b'$' {
                i += 1;
                continue;
            }

            let (name, consumed) = match bytes.get(i + 1) {
                Some(b'{') => match input[i + 2..].find('}') {
                    Some(end) => (&input[i + 2..i + 2 + end], end + 3),
                    None => ("", 0),
                },
                Some(_) => {
                    let len = input[i + 1..]
                        .bytes()
                        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                        .count();
                    (&input[i + 1..i + 1 + len], len + 1)
                }
                None => ("", 0),
            };

            if name.is_empty() {
                i += 1;
                continue;
            }

            out.push_str(&input[plain..i]);
            out.push_str(self.get(name).unwrap_or_default());
            i += consumed;
            plain = i;
        }

        out.push_str(&input[plain..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Env;

    fn env() -> Env {
        let mut env = Env::new();
        env.push("HOME", "/home/runner");
        env.push("NAME", "store");
        env
    }

    #[test]
    fn push_and_override_last_wins() {
        let mut env = Env::new();
        env.push("FOO", "one");
        env.push("FOO", "two");

        assert_eq!(env.get("FOO"), Some("two"));
        assert!(env.get("BAZ").is_none());
    }

    #[test]
    fn expands_plain_and_braced_references() {
        let env = env();
        assert_eq!(env.expand("$HOME/jobs"), "/home/runner/jobs");
        assert_eq!(env.expand("${HOME}/${NAME}-x"), "/home/runner/store-x");
    }

    #[test]
    fn unknown_variables_expand_to_empty() {
        assert_eq!(env().expand("/a/$MISSING/b"), "/a//b");
    }

    #[test]
    fn lone_dollar_is_kept() {
        let env = env();
        assert_eq!(env.expand("cost $ 5"), "cost $ 5");
        assert_eq!(env.expand("end$"), "end$");
        assert_eq!(env.expand("${unterminated"), "${unterminated");
    }

    #[test]
    fn serde_transparent_roundtrip_json() {
        let env = env();
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.starts_with('['));

        let back: Env = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
