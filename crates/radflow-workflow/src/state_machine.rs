//! 检查状态机
//!
//! 管理检查从登记到完成的状态转换，不存在回退的转换。

use radflow_core::{RadflowError, Result, StudyStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 检查状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StudyEvent {
    StartScan,         // 技师开始检查
    SendToRadiologist, // 检查完成，送交医生
    SignReport,        // 签发并打印报告
    MarkComplete,      // 医生确认完成
}

/// 检查状态机
#[derive(Debug)]
pub struct StudyStateMachine {
    transitions: HashMap<(StudyStatus, StudyEvent), StudyStatus>,
}

impl StudyStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((StudyStatus::Waiting, StudyEvent::StartScan), StudyStatus::Scanning);
        transitions.insert((StudyStatus::Scanning, StudyEvent::SendToRadiologist), StudyStatus::Reporting);
        transitions.insert((StudyStatus::Reporting, StudyEvent::SignReport), StudyStatus::Reported);
        // 重新打印报告保持 Reported
        transitions.insert((StudyStatus::Reported, StudyEvent::SignReport), StudyStatus::Reported);
        transitions.insert((StudyStatus::Reporting, StudyEvent::MarkComplete), StudyStatus::Completed);
        transitions.insert((StudyStatus::Reported, StudyEvent::MarkComplete), StudyStatus::Completed);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: StudyStatus, event: StudyEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: StudyStatus, event: StudyEvent) -> Result<StudyStatus> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| RadflowError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("{:?}", event),
            })
    }

    /// 找到从 `from` 直接到达 `to` 的事件
    ///
    /// 后端的 updateStudyStatus 只携带目标状态，用它反查事件。
    pub fn event_between(&self, from: StudyStatus, to: StudyStatus) -> Option<StudyEvent> {
        self.transitions
            .iter()
            .find(|((state, _), target)| *state == from && **target == to)
            .map(|((_, event), _)| *event)
    }

    /// 校验直接设置目标状态是否合法
    pub fn validate_target(&self, from: StudyStatus, to: StudyStatus) -> Result<StudyEvent> {
        self.event_between(from, to)
            .ok_or_else(|| RadflowError::InvalidStateTransition {
                from: from.to_string(),
                event: format!("set status {}", to),
            })
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: StudyStatus) -> Vec<StudyEvent> {
        let mut events: Vec<StudyEvent> = self
            .transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect();
        events.sort_by_key(|event| *event as u8);
        events
    }

    /// 是否为终态
    pub fn is_terminal(&self, state: StudyStatus) -> bool {
        self.get_possible_events(state).is_empty()
    }
}

impl Default for StudyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
