//! 工具参数 JSON Schema（schemars 自动生成）
//!
//! 各工具用带 JsonSchema 的参数结构体描述输入，schema_of 生成目录里的 input_schema，
//! parse_args 把 Planner 给出的 JSON 参数反序列化为该结构体。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 生成参数结构体的 JSON Schema（去掉 $schema / title 元信息）
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 解析工具参数；失败信息会成为工具的错误结果
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}
