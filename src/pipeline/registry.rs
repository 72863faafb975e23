//! Category registry: the routing policy table loaded once at startup.
//!
//! The registry file is a JSON object keyed by category name. Every entry is
//! validated up front; a registry that loads is guaranteed to be well-formed,
//! so the resolver and reminder policy never have to second-guess it.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::pipeline::types::Priority;

/// Prefixes stripped from project names before matching, in this order.
const PROJECT_PREFIXES: [&str; 3] = ["project ", "proj ", "prj "];

/// Key inside a project map that holds the fallback addresses.
const DEFAULT_PROJECT_KEY: &str = "default";

/// Where a category forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Every message in the category goes to the same addresses.
    FlatList(Vec<String>),
    /// Addresses chosen by project name, with an optional fallback list.
    ProjectMap {
        projects: BTreeMap<String, Vec<String>>,
        default: Option<Vec<String>>,
    },
}

/// Per-category reminder settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CalendarPolicy {
    /// Kill switch: no reminders at all when false.
    pub create_reminder: bool,
    /// Priorities that get a reminder. Empty means every priority.
    #[serde(
        rename = "calendar_priorities",
        alias = "priority_allowlist",
        deserialize_with = "strict_priorities"
    )]
    pub priority_allowlist: Vec<Priority>,
    /// Calendar color name (e.g. "red").
    pub color: Option<String>,
    /// Popup reminder lead time; falls back to the global setting.
    #[serde(rename = "reminder_advance")]
    pub reminder_advance_minutes: Option<u32>,
    /// Event length; falls back to the global setting.
    #[serde(rename = "default_duration")]
    pub duration_minutes: Option<u32>,
    /// Only create a reminder when the classifier found action items.
    pub require_action_items: bool,
}

/// One configured category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    /// Lowercased, unique name.
    pub name: String,
    pub enabled: bool,
    /// Hints for the classifier prompt; the routing engine never reads them.
    pub keywords: Vec<String>,
    pub targets: TargetSpec,
    pub calendar_settings: CalendarPolicy,
}

// ── File format ─────────────────────────────────────────────────────

/// One registry entry as written in the file.
#[derive(Debug, Deserialize)]
struct CategoryEntry {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    keywords: Vec<String>,
    #[serde(alias = "targets")]
    target_emails: TargetEntry,
    #[serde(default)]
    calendar_settings: Option<CalendarPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(
    untagged,
    expecting = "'target_emails' must be a list of addresses or an object of lists"
)]
enum TargetEntry {
    List(Vec<String>),
    Projects(BTreeMap<String, Vec<String>>),
}

fn enabled_by_default() -> bool {
    true
}

/// Priorities in the allowlist are parsed strictly, unlike classifier output.
fn strict_priorities<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Priority>, D::Error> {
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|p| p.parse().map_err(serde::de::Error::custom))
        .collect()
}

// ── Registry ────────────────────────────────────────────────────────

/// Immutable table of category definitions.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: BTreeMap<String, CategoryDefinition>,
}

impl CategoryRegistry {
    /// Build a registry from already-validated definitions.
    ///
    /// Names are lowercased; a later definition with the same name replaces
    /// an earlier one.
    pub fn new(definitions: impl IntoIterator<Item = CategoryDefinition>) -> Self {
        let categories = definitions
            .into_iter()
            .map(|mut def| {
                def.name = def.name.trim().to_lowercase();
                (def.name.clone(), def)
            })
            .collect();
        Self { categories }
    }

    /// Load and validate a registry file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            categories = registry.len(),
            enabled = registry.enabled().count(),
            "Loaded category registry"
        );
        Ok(registry)
    }

    /// Parse and validate a registry from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ConfigError::ParseError(format!("category registry: {e}")))?;
        Self::from_value(value)
    }

    /// Validate a registry from a parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(entries) = value else {
            return Err(ConfigError::ParseError(
                "category registry must be a JSON object".into(),
            ));
        };
        let address_pattern = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut categories = BTreeMap::new();
        for (raw_name, entry) in entries {
            let name = raw_name.trim().to_lowercase();
            if name.is_empty() {
                return Err(ConfigError::category(raw_name, "category name is empty"));
            }
            if categories.contains_key(&name) {
                return Err(ConfigError::category(
                    raw_name,
                    format!("collides with another category named '{name}'"),
                ));
            }
            let entry: CategoryEntry = serde_json::from_value(entry)
                .map_err(|e| ConfigError::category(&name, e.to_string()))?;
            let definition = validate_entry(&name, entry, &address_pattern)?;
            debug!(category = %name, enabled = definition.enabled, "Validated category");
            categories.insert(name, definition);
        }

        Ok(Self { categories })
    }

    /// Look up a category by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.get(&name.trim().to_lowercase())
    }

    /// Look up a category only if it exists and is enabled.
    pub fn get_enabled(&self, name: &str) -> Option<&CategoryDefinition> {
        self.get(name).filter(|def| def.enabled)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get_enabled(name).is_some()
    }

    /// Enabled categories in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.values().filter(|def| def.enabled)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Normalize a project name for matching: lowercase and trimmed, with each
/// of "project "/"proj "/"prj " stripped in turn when it leads.
pub fn normalize_project_name(name: &str) -> String {
    let mut normalized = name.trim().to_lowercase();
    for prefix in PROJECT_PREFIXES {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            normalized = rest.trim_start().to_string();
        }
    }
    normalized
}

// ── Validation ──────────────────────────────────────────────────────

fn validate_entry(
    name: &str,
    entry: CategoryEntry,
    address_pattern: &Regex,
) -> Result<CategoryDefinition, ConfigError> {
    let targets = match entry.target_emails {
        TargetEntry::List(addresses) => {
            TargetSpec::FlatList(checked_addresses(name, "target_emails", addresses, address_pattern)?)
        }
        TargetEntry::Projects(map) => {
            let mut projects = BTreeMap::new();
            let mut default = None;
            for (project, addresses) in map {
                let key = format!("target_emails.{project}");
                let addresses = checked_addresses(name, &key, addresses, address_pattern)?;
                if project.trim().eq_ignore_ascii_case(DEFAULT_PROJECT_KEY) {
                    default = Some(addresses);
                    continue;
                }
                let normalized = normalize_project_name(&project);
                if normalized.is_empty() {
                    return Err(ConfigError::category(
                        name,
                        format!("project key '{project}' is empty after normalization"),
                    ));
                }
                if projects.insert(normalized.clone(), addresses).is_some() {
                    return Err(ConfigError::category(
                        name,
                        format!("project key '{project}' collides with another key ('{normalized}')"),
                    ));
                }
            }
            TargetSpec::ProjectMap { projects, default }
        }
    };

    let mut calendar_settings = entry.calendar_settings.unwrap_or_default();
    calendar_settings.color = calendar_settings
        .color
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    Ok(CategoryDefinition {
        name: name.to_string(),
        enabled: entry.enabled,
        keywords: entry.keywords.iter().map(|kw| kw.trim().to_string()).collect(),
        targets,
        calendar_settings,
    })
}

fn checked_addresses(
    name: &str,
    key: &str,
    addresses: Vec<String>,
    address_pattern: &Regex,
) -> Result<Vec<String>, ConfigError> {
    addresses
        .into_iter()
        .map(|address| {
            let address = address.trim().to_string();
            if address_pattern.is_match(&address) {
                Ok(address)
            } else {
                Err(ConfigError::category(
                    name,
                    format!("'{key}' contains an invalid address '{address}'"),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"{
        "Invoice": {
            "keywords": ["invoice", "payment"],
            "target_emails": ["finance@x.com"],
            "calendar_settings": {
                "create_reminder": true,
                "calendar_priorities": ["Urgent", "high"],
                "color": "Orange",
                "reminder_advance": 30
            }
        },
        "projects": {
            "enabled": true,
            "keywords": ["project"],
            "target_emails": {
                "Project Atlas": ["atlas@x.com"],
                "phoenix": ["phoenix@x.com"],
                "default": ["d@x.com"]
            }
        },
        "newsletters": {
            "enabled": false,
            "keywords": [],
            "target_emails": []
        }
    }"#;

    #[test]
    fn loads_sample_registry() {
        let registry = CategoryRegistry::from_json_str(SAMPLE).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.enabled().count(), 2);

        let invoice = registry.get("INVOICE").unwrap();
        assert_eq!(invoice.name, "invoice");
        assert!(invoice.enabled);
        assert_eq!(invoice.targets, TargetSpec::FlatList(vec!["finance@x.com".into()]));
        assert_eq!(
            invoice.calendar_settings.priority_allowlist,
            vec![Priority::Urgent, Priority::High]
        );
        assert_eq!(invoice.calendar_settings.color.as_deref(), Some("orange"));
        assert_eq!(invoice.calendar_settings.reminder_advance_minutes, Some(30));
        assert_eq!(invoice.calendar_settings.duration_minutes, None);
    }

    #[test]
    fn project_keys_are_normalized_and_default_split_out() {
        let registry = CategoryRegistry::from_json_str(SAMPLE).unwrap();
        match &registry.get("projects").unwrap().targets {
            TargetSpec::ProjectMap { projects, default } => {
                assert_eq!(projects.keys().collect::<Vec<_>>(), vec!["atlas", "phoenix"]);
                assert_eq!(default.as_deref(), Some(&["d@x.com".to_string()][..]));
            }
            other => panic!("Expected ProjectMap, got {:?}", other),
        }
    }

    #[test]
    fn disabled_category_is_not_enabled() {
        let registry = CategoryRegistry::from_json_str(SAMPLE).unwrap();
        assert!(registry.get("newsletters").is_some());
        assert!(registry.get_enabled("newsletters").is_none());
        assert!(!registry.is_enabled("unknown"));
    }

    #[test]
    fn missing_calendar_settings_means_no_reminder() {
        let registry = CategoryRegistry::from_json_str(SAMPLE).unwrap();
        let projects = registry.get("projects").unwrap();
        assert!(!projects.calendar_settings.create_reminder);
    }

    #[test]
    fn rejects_missing_targets() {
        let err = CategoryRegistry::from_json_str(r#"{"a": {"keywords": []}}"#).unwrap_err();
        assert!(err.to_string().contains("target_emails"));
    }

    #[test]
    fn rejects_missing_keywords() {
        let err =
            CategoryRegistry::from_json_str(r#"{"a": {"target_emails": ["a@x.com"]}}"#).unwrap_err();
        assert!(err.to_string().contains("keywords"));
    }

    #[test]
    fn rejects_string_target_spec() {
        let err = CategoryRegistry::from_json_str(
            r#"{"a": {"keywords": [], "target_emails": "a@x.com"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCategory { .. }));
    }

    #[test]
    fn rejects_unknown_priority_in_allowlist() {
        let err = CategoryRegistry::from_json_str(
            r#"{"bank": {"keywords": [], "target_emails": [],
                "calendar_settings": {"create_reminder": true, "calendar_priorities": ["important"]}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("important"));
    }

    #[test]
    fn rejects_invalid_address() {
        let err = CategoryRegistry::from_json_str(
            r#"{"a": {"keywords": [], "target_emails": ["not-an-address"]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }

    #[test]
    fn rejects_case_colliding_names() {
        let err = CategoryRegistry::from_json_str(
            r#"{"Work": {"keywords": [], "target_emails": []},
                "work": {"keywords": [], "target_emails": []}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn rejects_negative_duration() {
        let err = CategoryRegistry::from_json_str(
            r#"{"a": {"keywords": [], "target_emails": [],
                "calendar_settings": {"default_duration": -5}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCategory { ref category, .. } if category == "a"));
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn rejects_non_boolean_enabled() {
        let err = CategoryRegistry::from_json_str(
            r#"{"a": {"enabled": "yes", "keywords": [], "target_emails": []}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCategory { .. }));
    }

    #[test]
    fn null_calendar_settings_means_no_reminder() {
        let registry = CategoryRegistry::from_json_str(
            r#"{"a": {"keywords": [], "target_emails": [], "calendar_settings": null}}"#,
        )
        .unwrap();
        assert_eq!(registry.get("a").unwrap().calendar_settings, CalendarPolicy::default());
    }

    #[test]
    fn accepts_priority_allowlist_alias() {
        let registry = CategoryRegistry::from_json_str(
            r#"{"a": {"keywords": [], "target_emails": [],
                "calendar_settings": {"priority_allowlist": ["low"]}}}"#,
        )
        .unwrap();
        assert_eq!(
            registry.get("a").unwrap().calendar_settings.priority_allowlist,
            vec![Priority::Low]
        );
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(CategoryRegistry::from_json_str("[]").is_err());
        assert!(CategoryRegistry::from_json_str("not json").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let registry = CategoryRegistry::from_path(file.path()).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CategoryRegistry::from_path(Path::new("/nonexistent/categories.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn normalizes_project_prefixes() {
        assert_eq!(normalize_project_name("Project Zeus"), "zeus");
        assert_eq!(normalize_project_name("PROJ Atlas"), "atlas");
        assert_eq!(normalize_project_name("prj phoenix"), "phoenix");
        assert_eq!(normalize_project_name("Projector"), "projector");
    }

    #[test]
    fn strips_stacked_project_prefixes() {
        assert_eq!(normalize_project_name("Project prj Atlas"), "atlas");
        assert_eq!(normalize_project_name("project proj prj Zeus"), "zeus");
    }
}
