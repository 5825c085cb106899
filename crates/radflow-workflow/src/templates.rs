//! 报告模板库
//!
//! 模板按 设备类型 → 部位 → 所见 三级组织。模板正文中的 `{{字段}}`
//! 在插入时逐个向用户询问并替换。

use radflow_core::{Modality, Template};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// 占位符询问接口（由界面层实现）
pub trait PlaceholderPrompt {
    /// 返回 `None` 表示用户取消，占位符保持原样
    fn prompt(&mut self, field: &str) -> Option<String>;
}

impl<F> PlaceholderPrompt for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn prompt(&mut self, field: &str) -> Option<String> {
        self(field)
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_ ]+?)\s*\}\}").unwrap())
}

type FindingMap = BTreeMap<String, String>;
type RegionMap = BTreeMap<String, FindingMap>;

/// 模板库
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    entries: BTreeMap<String, RegionMap>,
}

impl TemplateLibrary {
    /// 内置模板
    pub fn builtin() -> Self {
        let mut library = Self::default();

        library.add(&Modality::Us, "Abdomen", "Normal",
            "<p>Liver is normal in size ({{liver_size}} cm) with homogeneous echotexture.</p>\
             <p>Gallbladder, pancreas, spleen and both kidneys are unremarkable.</p>");
        library.add(&Modality::Us, "Abdomen", "Fatty Liver",
            "<p>Liver measures {{liver_size}} cm with diffusely increased echogenicity, \
             consistent with grade {{grade}} fatty infiltration.</p>");
        library.add(&Modality::Us, "Abdomen", "Gallstones",
            "<p>Gallbladder contains {{count}} mobile echogenic foci with posterior \
             acoustic shadowing, the largest measuring {{size}} mm.</p>");
        library.add(&Modality::Ct, "Brain", "Normal",
            "<p>No intracranial haemorrhage, mass effect or midline shift.</p>\
             <p>Ventricles and sulci are age-appropriate.</p>");
        library.add(&Modality::Xr, "Chest", "Normal",
            "<p>Lungs are clear. Cardiothoracic ratio is {{ctr}}. No pleural effusion.</p>");
        library.add(&Modality::Mri, "Knee", "Normal",
            "<p>Menisci and cruciate ligaments are intact. No joint effusion.</p>");

        library
    }

    /// 内置模板加上用户保存的模板（同名时用户模板优先）
    pub fn with_templates(templates: &[Template]) -> Self {
        let mut library = Self::builtin();
        for template in templates {
            library.add(&template.modality, &template.region, &template.finding, &template.content);
        }
        library
    }

    pub fn add(&mut self, modality: &Modality, region: &str, finding: &str, content: &str) {
        self.entries
            .entry(modality.code().to_string())
            .or_default()
            .entry(region.to_string())
            .or_default()
            .insert(finding.to_string(), content.to_string());
    }

    pub fn modalities(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn regions(&self, modality: &Modality) -> Vec<&str> {
        self.entries
            .get(modality.code())
            .map(|regions| regions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn findings(&self, modality: &Modality, region: &str) -> Vec<&str> {
        self.entries
            .get(modality.code())
            .and_then(|regions| regions.get(region))
            .map(|findings| findings.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn lookup(&self, modality: &Modality, region: &str, finding: &str) -> Option<&str> {
        self.entries
            .get(modality.code())?
            .get(region)?
            .get(finding)
            .map(String::as_str)
    }

    /// 模板中的占位字段（按出现顺序去重）
    pub fn placeholders(content: &str) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for caps in placeholder_pattern().captures_iter(content) {
            let field = caps[1].to_string();
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// 逐个询问占位字段并替换
    pub fn fill(content: &str, prompt: &mut dyn PlaceholderPrompt) -> String {
        let mut answers: BTreeMap<String, Option<String>> = BTreeMap::new();
        for field in Self::placeholders(content) {
            let answer = prompt.prompt(&field);
            answers.insert(field, answer);
        }

        placeholder_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                match answers.get(&caps[1]) {
                    Some(Some(value)) => value.clone(),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_hierarchy() {
        let library = TemplateLibrary::builtin();
        assert!(library.modalities().contains(&"US"));
        assert!(library.regions(&Modality::Us).contains(&"Abdomen"));
        assert_eq!(library.findings(&Modality::Us, "Abdomen").len(), 3);
        assert!(library.lookup(&Modality::Ct, "Brain", "Normal").is_some());
        assert!(library.lookup(&Modality::Ct, "Spine", "Normal").is_none());
    }

    #[test]
    fn test_placeholders_are_prompted_once_each() {
        let content = "Liver {{liver_size}} cm, spleen {{ spleen }} cm, liver again {{liver_size}}";
        assert_eq!(TemplateLibrary::placeholders(content), vec!["liver_size", "spleen"]);

        let mut asked = Vec::new();
        let mut prompt = |field: &str| {
            asked.push(field.to_string());
            if field == "liver_size" { Some("14".to_string()) } else { None }
        };
        let filled = TemplateLibrary::fill(content, &mut prompt);

        assert_eq!(asked, vec!["liver_size", "spleen"]);
        assert_eq!(filled, "Liver 14 cm, spleen {{ spleen }} cm, liver again 14");
    }

    #[test]
    fn test_custom_templates_override_builtin() {
        let custom = Template {
            id: "TPL-1".to_string(),
            modality: Modality::Xr,
            region: "Chest".to_string(),
            finding: "Normal".to_string(),
            content: "<p>Custom normal chest.</p>".to_string(),
            created_at: String::new(),
        };
        let library = TemplateLibrary::with_templates(&[custom]);
        assert_eq!(
            library.lookup(&Modality::Xr, "Chest", "Normal"),
            Some("<p>Custom normal chest.</p>")
        );
    }
}
