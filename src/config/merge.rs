//! Recipe layer merging
//!
//! - Tables: merged key by key
//! - Arrays: replaced wholesale
//! - Scalars: the later layer wins
//! - Nulls: ignored, so a layer can never erase a key set below it; clear a
//!   string setting with `""` instead

use serde_json::Value;

/// Overlay `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (base, Value::Null) => base,
        (Value::Object(mut merged), Value::Object(top)) => {
            for (key, value) in top {
                if value.is_null() {
                    continue;
                }
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (_, top) => top,
    }
}

/// Fold layers lowest precedence first.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recipe_overrides_default_arch() {
        let defaults = json!({"appimage": {"arch": "x86_64", "embed-md5-digest": false}});
        let recipe = json!({"appimage": {"arch": "aarch64"}});

        let merged = deep_merge(defaults, recipe);
        assert_eq!(merged["appimage"]["arch"], "aarch64");
        assert_eq!(merged["appimage"]["embed-md5-digest"], false);
    }

    #[test]
    fn test_arrays_are_replaced() {
        let base = json!({"exclude": ["a", "b", "c"]});
        let overlay = json!({"exclude": ["z"]});

        let merged = deep_merge(base, overlay);
        assert_eq!(merged["exclude"], json!(["z"]));
    }

    #[test]
    fn test_new_keys_are_added() {
        let merged = deep_merge(
            json!({"appimage": {"arch": "x86_64"}}),
            json!({"appimage": {"sign-key": "ABCD1234"}}),
        );
        assert_eq!(merged["appimage"]["arch"], "x86_64");
        assert_eq!(merged["appimage"]["sign-key"], "ABCD1234");
    }

    #[test]
    fn test_null_overlay_keeps_lower_layer() {
        let merged = merge_layers(vec![
            json!({"appimage": {"sign-key": "ABCD1234", "arch": "x86_64"}}),
            json!({"appimage": {"sign-key": null}, "build": null}),
            Value::Null,
        ]);

        assert_eq!(merged["appimage"]["sign-key"], "ABCD1234");
        assert_eq!(merged["appimage"]["arch"], "x86_64");
        assert!(merged.get("build").is_none());
    }

    #[test]
    fn test_cli_layer_wins() {
        let merged = merge_layers(vec![
            json!({"appimage": {"arch": "x86_64"}, "build": {"output-dir": "."}}),
            json!({"appimage": {"arch": "i686"}, "build": {"output-dir": "dist"}}),
            json!({"appimage": {"arch": "armhf"}}),
        ]);

        assert_eq!(merged["appimage"]["arch"], "armhf");
        assert_eq!(merged["build"]["output-dir"], "dist");
    }
}
