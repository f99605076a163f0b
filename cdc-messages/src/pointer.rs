//! JSON Pointer (RFC 6901) path building.

/// Escapes a single reference token: `~` becomes `~0`, `/` becomes `~1`.
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Appends an unescaped token to a pointer.
pub fn push(pointer: &str, token: &str) -> String {
    format!("{}/{}", pointer, escape(token))
}

/// Appends an array index to a pointer.
pub fn push_index(pointer: &str, index: usize) -> String {
    format!("{}/{}", pointer, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape("a/b~c"), "a~1b~0c");
        // "~1" in a key must stay distinguishable from an escaped "/".
        assert_eq!(escape("~1"), "~01");
    }

    #[test]
    fn built_paths_resolve_through_serde_json() {
        let doc = json!({"a/b": [10, 20], "m~n": true});
        let path = push_index(&push("", "a/b"), 1);
        assert_eq!(path, "/a~1b/1");
        assert_eq!(doc.pointer(&path), Some(&json!(20)));
        assert_eq!(doc.pointer(&push("", "m~n")), Some(&json!(true)));
    }
}
