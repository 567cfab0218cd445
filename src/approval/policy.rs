//! 审批策略（Gating Policy）
//!
//! 构建引擎时从注册表拍一份 name -> gated 快照，运行期间不可更改，保证同一批在途请求的
//! 审批判定一致。

use std::collections::HashMap;

use crate::core::EngineError;
use crate::memory::ToolCallRequest;
use crate::tools::ToolRegistry;

/// 一轮工具调用按审批要求拆分的结果，两侧都保持原始顺序
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partition {
    pub ungated: Vec<ToolCallRequest>,
    pub gated: Vec<ToolCallRequest>,
}

/// 静态审批策略
#[derive(Debug, Clone, Default)]
pub struct GatingPolicy {
    flags: HashMap<String, bool>,
}

impl GatingPolicy {
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        Self {
            flags: registry
                .gating_flags()
                .map(|(name, gated)| (name.to_string(), gated))
                .collect(),
        }
    }

    /// 该工具是否需要审批；未注册的工具报 UnknownTool
    pub fn requires_approval(&self, tool_name: &str) -> Result<bool, EngineError> {
        self.flags
            .get(tool_name)
            .copied()
            .ok_or_else(|| EngineError::UnknownTool(tool_name.to_string()))
    }

    /// 按审批要求拆分；先校验全部工具名，任一未知则整体失败（此时尚未执行任何调用）
    pub fn partition(&self, calls: &[ToolCallRequest]) -> Result<Partition, EngineError> {
        let mut partition = Partition::default();
        for call in calls {
            if self.requires_approval(&call.tool_name)? {
                partition.gated.push(call.clone());
            } else {
                partition.ungated.push(call.clone());
            }
        }
        Ok(partition)
    }

    pub fn gated_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .flags
            .iter()
            .filter(|(_, gated)| **gated)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}
