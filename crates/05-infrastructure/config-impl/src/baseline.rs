//! 基线配置
//!
//! 存储从未初始化时写入的初始配置文档，按扩展名解析 JSON、TOML 或 YAML。

use infrastructure_common::ConfigError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 版本标记所在的顶层键
pub const VERSION_KEY: &str = "_version";

/// 工作区所在的顶层键
pub const WORKSPACES_KEY: &str = "workspaces";

/// 用户密码字段
pub const PASSWORD_FIELD: &str = "_password";

/// 基线配置文档
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    path: PathBuf,
    document: Map<String, Value>,
}

impl Baseline {
    /// 加载基线配置文件
    ///
    /// 文件不可读、格式错误、顶层不是对象或缺少 `_version` 时返回
    /// [`ConfigError::BaselineInvalid`]。
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("加载基线配置文件: {}", path.display());
        let invalid = |message: String| ConfigError::baseline_invalid(path.display().to_string(), message);

        let content =
            std::fs::read_to_string(path).map_err(|e| invalid(format!("无法读取文件: {}", e)))?;
        let document = parse_document(path, &content).map_err(invalid)?;
        Self::from_value(path, document)
    }

    /// 从已解析的文档创建基线
    pub fn from_value(path: &Path, document: Value) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::baseline_invalid(path.display().to_string(), message);

        let Value::Object(document) = document else {
            return Err(invalid("顶层必须是对象"));
        };
        match document.get(VERSION_KEY) {
            None | Some(Value::Null) => return Err(invalid("缺少 _version")),
            Some(Value::Object(_)) | Some(Value::Array(_)) => {
                return Err(invalid("_version 必须是标量"))
            }
            Some(_) => {}
        }

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 基线声明的版本
    pub fn version(&self) -> &Value {
        &self.document[VERSION_KEY]
    }

    /// 除 `_version` 之外的顶层配置节
    pub fn sections(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.document
            .iter()
            .filter(|(name, _)| name.as_str() != VERSION_KEY)
    }

    /// 所有工作区及其用户名，按名称排序
    pub fn workspace_users(&self) -> Vec<(String, Vec<String>)> {
        let Some(Value::Object(workspaces)) = self.document.get(WORKSPACES_KEY) else {
            return Vec::new();
        };
        let mut result: Vec<(String, Vec<String>)> = workspaces
            .iter()
            .map(|(workspace, definition)| {
                let mut users: Vec<String> = definition
                    .get("users")
                    .and_then(Value::as_object)
                    .map(|users| users.keys().cloned().collect())
                    .unwrap_or_default();
                users.sort();
                (workspace.clone(), users)
            })
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// 基线中用户的明文密码
    pub fn plaintext_password(&self, workspace: &str, user: &str) -> Option<&str> {
        self.document
            .get(WORKSPACES_KEY)?
            .get(workspace)?
            .get("users")?
            .get(user)?
            .get(PASSWORD_FIELD)?
            .as_str()
    }
}

fn parse_document(path: &Path, content: &str) -> Result<Value, String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("toml") => toml::from_str::<toml::Value>(content)
            .map(toml_to_json)
            .map_err(|e| format!("TOML 解析失败: {}", e)),
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|e| format!("YAML 解析失败: {}", e))
        }
        _ => serde_json::from_str(content).map_err(|e| format!("JSON 解析失败: {}", e)),
    }
}

/// 将 TOML 值转换为 JSON 值
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
    }
}
