//! 报告草稿编辑
//!
//! 草稿以HTML片段保存。只有检查的指定医生（或管理员）可以编辑，
//! 其他医生打开时为只读；这一限制只在客户端执行。

use radflow_core::{Modality, Patient, RadflowError, Result, Role, Study};
use serde::Serialize;
use std::collections::HashSet;

use crate::templates::{PlaceholderPrompt, TemplateLibrary};

/// 新报告的默认内容
pub const DEFAULT_REPORT_HTML: &str =
    "<p>No significant abnormality detected.</p><p>Normal study.</p>";

/// 可导入报告的临床信息
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum ClinicalContext {
    ChiefComplaint,
    Diagnosis,
    History,
}

impl ClinicalContext {
    pub fn label(&self) -> &'static str {
        match self {
            ClinicalContext::ChiefComplaint => "Chief Complaint",
            ClinicalContext::Diagnosis => "Diagnosis",
            ClinicalContext::History => "Medical History",
        }
    }

    fn value_from<'a>(&self, patient: &'a Patient) -> &'a str {
        match self {
            ClinicalContext::ChiefComplaint => &patient.complaint,
            ClinicalContext::Diagnosis => &patient.diagnosis,
            ClinicalContext::History => &patient.medical_history,
        }
    }
}

/// 报告草稿
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub study_id: String,
    pub modality: Modality,
    pub region: String,
    content: String,
    read_only: bool,
    checked: HashSet<ClinicalContext>,
    inserted: HashSet<ClinicalContext>,
    dirty: bool,
}

impl ReportDraft {
    /// 打开检查的报告草稿
    pub fn open(study: &Study, editor_id: &str, editor_role: Role) -> Self {
        let content = study
            .report_content
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REPORT_HTML.to_string());
        let read_only = match editor_role {
            Role::Admin => false,
            Role::Radiologist => study.assigned_doctor_id != editor_id,
            _ => true,
        };

        Self {
            study_id: study.id.clone(),
            modality: study.modality.clone(),
            region: study.region.clone(),
            content,
            read_only,
            checked: HashSet::new(),
            inserted: HashSet::new(),
            dirty: false,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.read_only {
            Err(RadflowError::Permission(
                "This report is locked to the assigned radiologist".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// 替换整个报告内容
    pub fn set_content(&mut self, html: impl Into<String>) -> Result<()> {
        self.ensure_editable()?;
        self.content = html.into();
        self.dirty = true;
        Ok(())
    }

    pub fn append_html(&mut self, html: &str) -> Result<()> {
        self.ensure_editable()?;
        self.content.push_str(html);
        self.dirty = true;
        Ok(())
    }

    /// 插入模板片段，占位符在插入时逐个询问
    pub fn insert_template(
        &mut self,
        library: &TemplateLibrary,
        finding: &str,
        prompt: &mut dyn PlaceholderPrompt,
    ) -> Result<()> {
        self.ensure_editable()?;
        let template = library
            .lookup(&self.modality, &self.region, finding)
            .ok_or_else(|| {
                RadflowError::NotFound(format!(
                    "No template for {} / {} / {}",
                    self.modality, self.region, finding
                ))
            })?;
        let filled = TemplateLibrary::fill(template, prompt);
        self.append_html(&filled)
    }

    /// 勾选/取消临床信息
    ///
    /// 勾选时插入一次；取消勾选不会删除已插入的文本。返回本次是否插入了内容。
    pub fn toggle_context(
        &mut self,
        context: ClinicalContext,
        checked: bool,
        patient: &Patient,
    ) -> Result<bool> {
        self.ensure_editable()?;
        if !checked {
            self.checked.remove(&context);
            return Ok(false);
        }

        self.checked.insert(context);
        let value = context.value_from(patient).trim();
        if value.is_empty() || self.inserted.contains(&context) {
            return Ok(false);
        }

        let snippet = format!(
            "<p><strong>{}:</strong> {}</p>",
            context.label(),
            escape_html(value)
        );
        self.append_html(&snippet)?;
        self.inserted.insert(context);
        Ok(true)
    }

    pub fn is_context_checked(&self, context: ClinicalContext) -> bool {
        self.checked.contains(&context)
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
