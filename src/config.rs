use crate::errors::ConfigError;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

const DEFAULT_CUP_CATEGORIES: &str = "Mono:24435,25539,21671,25546,25775,25777,25789;\
Blend:23076,21882,25767,248882,25788;\
Caotina:24491,21385";
const DEFAULT_PACKAGE_GROUPS: &str = "11077,16279,16276";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CupCategory {
    pub name: String,
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialSourcePolicy {
    /// Refuse to render when any metric query failed.
    #[default]
    Fail,
    /// Merge what arrived and treat the failed source as all zeros.
    Zero,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub port: u16,
    pub proxy_api_url: String,
    pub proxy_primary_token: String,
    pub proxy_fallback_token: Option<String>,
    pub proxy_timeout: Duration,
    pub cup_categories: Vec<CupCategory>,
    pub package_groups: Vec<i64>,
    pub partial_sources: PartialSourcePolicy,
    pub stock_query: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let proxy_primary_token =
            var("PROXY_PRIMARY_TOKEN").ok_or(ConfigError::Missing("PROXY_PRIMARY_TOKEN"))?;

        let port = match var("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|err| ConfigError::Invalid {
                name: "PORT",
                reason: err.to_string(),
            })?,
            None => 8080,
        };

        let timeout_secs = match var("PROXY_TIMEOUT") {
            Some(value) => value.trim().parse::<u64>().map_err(|err| ConfigError::Invalid {
                name: "PROXY_TIMEOUT",
                reason: err.to_string(),
            })?,
            None => 5,
        };

        let cup_categories = parse_cup_categories(
            &var("CUP_CATEGORIES").unwrap_or_else(|| DEFAULT_CUP_CATEGORIES.to_string()),
        )?;
        let package_groups = parse_group_ids(
            "PACKAGE_GROUPS",
            &var("PACKAGE_GROUPS").unwrap_or_else(|| DEFAULT_PACKAGE_GROUPS.to_string()),
        )?;
        if package_groups.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PACKAGE_GROUPS",
                reason: "at least one group id is required".to_string(),
            });
        }

        let partial_sources = match var("PARTIAL_SOURCES").as_deref().map(str::trim) {
            None | Some("fail") => PartialSourcePolicy::Fail,
            Some("zero") => PartialSourcePolicy::Zero,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PARTIAL_SOURCES",
                    reason: format!("expected 'fail' or 'zero', got '{other}'"),
                });
            }
        };

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or_else(|| "Sales Dashboard".to_string()),
            app_version: var("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            port,
            proxy_api_url: var("PROXY_API_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            proxy_primary_token,
            proxy_fallback_token: var("PROXY_FALLBACK_TOKEN"),
            proxy_timeout: Duration::from_secs(timeout_secs),
            cup_categories,
            package_groups,
            partial_sources,
            stock_query: var("STOCK_QUERY"),
        })
    }

    pub fn category_names(&self) -> Vec<String> {
        self.cup_categories
            .iter()
            .map(|category| category.name.clone())
            .collect()
    }
}

/// Parses `Name:id,id;Name:id`. Names become SQL column aliases, so they must
/// be alphanumeric, and a group may only feed one category.
pub fn parse_cup_categories(value: &str) -> Result<Vec<CupCategory>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "CUP_CATEGORIES",
        reason,
    };

    let mut categories: Vec<CupCategory> = Vec::new();
    let mut seen_groups = HashSet::new();

    for entry in value.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, ids) = entry
            .split_once(':')
            .ok_or_else(|| invalid(format!("'{entry}' is not in Name:id,id form")))?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid(format!("category name '{name}' must be alphanumeric")));
        }
        if categories.iter().any(|category| category.name == name) {
            return Err(invalid(format!("category '{name}' is listed twice")));
        }

        let group_ids = parse_group_ids("CUP_CATEGORIES", ids)?;
        if group_ids.is_empty() {
            return Err(invalid(format!("category '{name}' has no group ids")));
        }
        for id in &group_ids {
            if !seen_groups.insert(*id) {
                return Err(invalid(format!("group {id} belongs to more than one category")));
            }
        }

        categories.push(CupCategory {
            name: name.to_string(),
            group_ids,
        });
    }

    if categories.is_empty() {
        return Err(invalid("at least one category is required".to_string()));
    }
    Ok(categories)
}

fn parse_group_ids(name: &'static str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<i64>().map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("'{item}' is not a group id"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let settings = settings(&[("PROXY_PRIMARY_TOKEN", "secret")]).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.proxy_timeout, Duration::from_secs(5));
        assert_eq!(settings.proxy_fallback_token, None);
        assert_eq!(settings.category_names(), vec!["Mono", "Blend", "Caotina"]);
        assert_eq!(settings.cup_categories[2].group_ids, vec![24491, 21385]);
        assert_eq!(settings.package_groups, vec![11077, 16279, 16276]);
        assert_eq!(settings.partial_sources, PartialSourcePolicy::Fail);
        assert!(settings.stock_query.is_none());
    }

    #[test]
    fn primary_token_is_required() {
        let err = settings(&[("PROXY_FALLBACK_TOKEN", "x")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("PROXY_PRIMARY_TOKEN"));
    }

    #[test]
    fn overrides_are_read() {
        let settings = settings(&[
            ("PROXY_PRIMARY_TOKEN", "a"),
            ("PROXY_FALLBACK_TOKEN", "b"),
            ("PROXY_API_URL", "http://proxy:9000/"),
            ("PROXY_TIMEOUT", "12"),
            ("PARTIAL_SOURCES", "zero"),
            ("CUP_CATEGORIES", "Espresso:1,2; Tea:3"),
            ("PACKAGE_GROUPS", "9"),
        ])
        .unwrap();
        assert_eq!(settings.proxy_api_url, "http://proxy:9000");
        assert_eq!(settings.proxy_fallback_token.as_deref(), Some("b"));
        assert_eq!(settings.proxy_timeout, Duration::from_secs(12));
        assert_eq!(settings.partial_sources, PartialSourcePolicy::Zero);
        assert_eq!(settings.category_names(), vec!["Espresso", "Tea"]);
        assert_eq!(settings.package_groups, vec![9]);
    }

    #[test]
    fn cup_categories_reject_bad_input() {
        assert!(parse_cup_categories("Mono 1:1").is_err());
        assert!(parse_cup_categories("Mono:1;Blend:1").is_err());
        assert!(parse_cup_categories("Mono:1;Mono:2").is_err());
        assert!(parse_cup_categories("Mono:x").is_err());
        assert!(parse_cup_categories("Mono:").is_err());
        assert!(parse_cup_categories("").is_err());
    }

    #[test]
    fn invalid_partial_policy_is_rejected() {
        let err = settings(&[("PROXY_PRIMARY_TOKEN", "a"), ("PARTIAL_SOURCES", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PARTIAL_SOURCES", .. }));
    }
}
