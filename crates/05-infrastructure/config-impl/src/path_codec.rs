//! 层级路径编解码
//!
//! 存储使用扁平的 `a:b:c` 键，镜像使用嵌套对象，两者通过这里的纯函数互相转换。

use serde_json::{Map, Value};
use tracing::warn;

/// 路径分隔符
pub const DELIMITER: char = ':';

/// 拆分路径，空路径或包含空段时返回 `None`
pub fn split(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split(DELIMITER).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return None;
    }
    Some(segments)
}

/// 用分隔符拼接路径段
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// 把 `value` 写入 `tree` 中 `path` 所指位置，沿途创建缺失的中间节点。
///
/// 中间节点若已存在但不是对象（例如之前是叶子值），会被新对象静默替换：
/// 路径级别后写者胜出，替换会记录告警日志。
/// 路径无效时不修改 `tree` 并返回 `false`。
pub fn unflatten_into(tree: &mut Value, path: &str, value: Value) -> bool {
    let Some(segments) = split(path) else {
        return false;
    };
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut node = tree;
    for (depth, segment) in parents.iter().enumerate() {
        let map = ensure_object(node, &segments[..depth]);
        node = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node, parents).insert((*last).to_string(), value);
    true
}

/// 读取 `path` 所指节点
pub fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split(path)?;
    let mut node = tree;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// 移除 `path` 所指节点并返回旧值
pub fn remove(tree: &mut Value, path: &str) -> Option<Value> {
    let segments = split(path)?;
    let (last, parents) = segments.split_last()?;
    let mut node = tree;
    for segment in parents {
        node = node.as_object_mut()?.get_mut(*segment)?;
    }
    node.as_object_mut()?.remove(*last)
}

/// 展开为 `(叶子路径, 值)` 列表；空对象视为叶子
pub fn flatten(tree: &Value) -> Vec<(String, Value)> {
    let mut leaves = Vec::new();
    if let Value::Object(map) = tree {
        for (key, child) in map {
            collect_leaves(child, key.clone(), &mut leaves);
        }
    }
    leaves
}

fn collect_leaves(node: &Value, prefix: String, leaves: &mut Vec<(String, Value)>) {
    match node {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, format!("{}{}{}", prefix, DELIMITER, key), leaves);
            }
        }
        other => leaves.push((prefix, other.clone())),
    }
}

fn ensure_object<'a>(node: &'a mut Value, at: &[&str]) -> &'a mut Map<String, Value> {
    if !node.is_object() {
        warn!(
            "路径节点不是对象，已替换为空对象: {:?} (原值: {})",
            join(at),
            node
        );
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("节点已替换为对象"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_rejects_empty_segments() {
        assert_eq!(split("a:b:c"), Some(vec!["a", "b", "c"]));
        assert_eq!(split(""), None);
        assert_eq!(split("a::c"), None);
        assert_eq!(split(":a"), None);
        assert_eq!(split("a:"), None);
    }

    #[test]
    fn test_unflatten_creates_intermediate_nodes() {
        let mut tree = json!({});
        assert!(unflatten_into(&mut tree, "workspaces:acme:users:bob:_password", json!("x")));
        assert_eq!(tree, json!({"workspaces": {"acme": {"users": {"bob": {"_password": "x"}}}}}));
    }

    #[test]
    fn test_unflatten_keeps_siblings() {
        let mut tree = json!({"a": {"b": 1, "c": 2}});
        assert!(unflatten_into(&mut tree, "a:b", json!(10)));
        assert_eq!(tree, json!({"a": {"b": 10, "c": 2}}));
    }

    #[test]
    fn test_unflatten_replaces_scalar_intermediate() {
        let mut tree = json!({"a": 5});
        assert!(unflatten_into(&mut tree, "a:b", json!(true)));
        assert_eq!(tree, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_unflatten_replaces_scalar_root() {
        let mut tree = Value::Null;
        assert!(unflatten_into(&mut tree, "version", json!("1")));
        assert_eq!(tree, json!({"version": "1"}));
    }

    #[test]
    fn test_unflatten_invalid_path_is_noop() {
        let mut tree = json!({"a": 1});
        assert!(!unflatten_into(&mut tree, "", json!(2)));
        assert!(!unflatten_into(&mut tree, "a::b", json!(2)));
        assert_eq!(tree, json!({"a": 1}));
    }

    #[test]
    fn test_lookup_and_remove() {
        let mut tree = json!({"a": {"b": {"c": 3}}});
        assert_eq!(lookup(&tree, "a:b:c"), Some(&json!(3)));
        assert_eq!(lookup(&tree, "a:x"), None);
        assert_eq!(lookup(&tree, "a:b:c:d"), None);

        assert_eq!(remove(&mut tree, "a:b"), Some(json!({"c": 3})));
        assert_eq!(tree, json!({"a": {}}));
        assert_eq!(remove(&mut tree, "a:b"), None);
    }

    #[test]
    fn test_flatten_inverts_unflatten() {
        let source = json!({
            "store": {"redis": {"host": "localhost", "port": 6379}},
            "empty": {},
            "list": [1, 2]
        });
        let leaves = flatten(&source);
        assert_eq!(leaves.len(), 4);

        let mut rebuilt = json!({});
        for (path, value) in leaves {
            assert!(unflatten_into(&mut rebuilt, &path, value));
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_join() {
        assert_eq!(join(&["a", "b"]), "a:b");
        assert_eq!(join::<&str>(&[]), "");
    }
}
