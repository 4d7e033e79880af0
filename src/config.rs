//! 配置模块，负责加载JSON配置文件

use crate::engine::Record;
use crate::error::ACCESS_DENIED_MESSAGE;
use crate::store::{SavedView, SAVED_QUERY_ENTITY};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 配置错误
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "配置错误: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// 拦截器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// 保存视图所在的实体，对该实体的查询永远不会被改写
    pub definitions_entity: String,
    /// 隐藏视图名称中的标记
    pub hidden_marker: String,
    /// 单条记录访问被拒绝时返回给调用方的消息
    pub access_denied_message: String,
    /// 实体名到数据库表名的映射
    pub table_mapping: HashMap<String, String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            definitions_entity: SAVED_QUERY_ENTITY.to_string(),
            hidden_marker: "/type=hidden".to_string(),
            access_denied_message: ACCESS_DENIED_MESSAGE.to_string(),
            table_mapping: HashMap::new(),
        }
    }
}

impl InterceptorConfig {
    /// 从JSON文件加载拦截器配置，缺失的字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// 获取实体对应的表名，如果不存在则返回小写的实体名
    pub fn get_table_name(&self, entity: &str) -> String {
        self.table_mapping
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_lowercase())
    }
}

/// 控制台与测试使用的内存数据：保存视图和各实体的记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub views: Vec<SavedView>,
    pub records: HashMap<String, Vec<Record>>,
}

impl Fixture {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    // 检查文件是否存在
    if !path.exists() {
        return Err(ConfigError::new(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }

    // 读取文件内容
    let content = fs::read_to_string(path).map_err(|e| {
        ConfigError::new(format!("无法读取配置文件 {}: {}", path.display(), e))
    })?;

    // 解析JSON
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::new(format!("无法解析JSON配置文件 {}: {}", path.display(), e))
    })
}
