//! 界面交互接口
//!
//! 确认框、提示框和输入框由宿主界面实现；控制器只依赖这个接口。

use radflow_workflow::PlaceholderPrompt;
use std::collections::VecDeque;
use std::sync::Mutex;

pub trait Prompter: Send + Sync {
    /// 阻塞式确认，返回 `false` 表示用户取消
    fn confirm(&self, message: &str) -> bool;

    /// 阻塞式提示
    fn alert(&self, message: &str);

    /// 文本输入，`None` 表示取消
    fn prompt(&self, label: &str) -> Option<String>;
}

/// 让模板占位符通过界面逐个询问
pub struct PromptFields<'a>(pub &'a dyn Prompter);

impl PlaceholderPrompt for PromptFields<'_> {
    fn prompt(&mut self, field: &str) -> Option<String> {
        self.0.prompt(field)
    }
}

/// 预设应答的交互实现（无人值守终端与测试）
#[derive(Debug)]
pub struct ScriptedPrompter {
    confirm: bool,
    answers: Mutex<VecDeque<Option<String>>>,
    alerts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// 所有确认都通过
    pub fn accepting() -> Self {
        Self {
            confirm: true,
            answers: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// 所有确认都取消
    pub fn declining() -> Self {
        Self {
            confirm: false,
            ..Self::accepting()
        }
    }

    /// 按顺序回答输入框，答完后返回 `None`
    pub fn with_answers<I>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..self
        }
    }

    /// 已显示过的提示
    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl Default for ScriptedPrompter {
    fn default() -> Self {
        Self::accepting()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str) -> bool {
        tracing::debug!("Confirm '{}' -> {}", message, self.confirm);
        self.confirm
    }

    fn alert(&self, message: &str) {
        tracing::info!("Alert: {}", message);
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message.to_string());
        }
    }

    fn prompt(&self, label: &str) -> Option<String> {
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .flatten();
        tracing::debug!("Prompt '{}' -> {:?}", label, answer);
        answer
    }
}
