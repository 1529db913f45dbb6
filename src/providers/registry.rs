//! Static provider configuration, validated once at startup.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use regex::Regex;
use tracing::info;

use crate::config::Config;
use crate::errors::AppError;
use crate::providers::ProviderId;

/// Read-only configuration for one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    /// Trigger pattern: a match raises the provider's routing confidence to
    /// the pattern-match floor.
    pub trigger: Regex,
    /// Lower value = higher precedence; tie-break for equal confidence.
    pub priority: u8,
    /// Providers that must complete before this one runs.
    pub dependencies: HashSet<ProviderId>,
    /// Cache TTL for this provider's results. Zero means never read or write
    /// this provider's cache bucket.
    pub cache_ttl: Duration,
}

impl ProviderConfig {
    pub fn new(
        id: ProviderId,
        trigger: &str,
        priority: u8,
        dependencies: HashSet<ProviderId>,
        cache_ttl: Duration,
    ) -> Result<Self, AppError> {
        let trigger = Regex::new(trigger)
            .map_err(|e| AppError::ConfigError(format!("invalid trigger for {id}: {e}")))?;
        Ok(Self {
            id,
            trigger,
            priority,
            dependencies,
            cache_ttl,
        })
    }
}

/// Closed map of provider identity to configuration.
///
/// Construction validates that every dependency refers to a registered
/// provider and that the dependency graph is acyclic; either violation is a
/// fatal configuration error and the process must not serve requests.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    configs: Vec<ProviderConfig>,
    index: HashMap<ProviderId, usize>,
}

impl ProviderRegistry {
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, AppError> {
        let mut index = HashMap::new();
        for (i, config) in configs.iter().enumerate() {
            if index.insert(config.id, i).is_some() {
                return Err(AppError::ConfigError(format!(
                    "provider {} registered twice",
                    config.id
                )));
            }
        }

        for config in &configs {
            for dep in &config.dependencies {
                if !index.contains_key(dep) {
                    return Err(AppError::ConfigError(format!(
                        "provider {} depends on unregistered provider {}",
                        config.id, dep
                    )));
                }
            }
        }

        let registry = Self { configs, index };
        registry.check_acyclic()?;
        info!(providers = registry.configs.len(), "Provider registry validated");
        Ok(registry)
    }

    /// Built-in provider table. TTL overrides from the config are applied
    /// here; everything else is compiled in.
    pub fn with_defaults(config: &Config) -> Result<Self, AppError> {
        let ttl = |id: ProviderId, default_secs: i64| {
            config
                .provider_ttl_overrides
                .get(&id)
                .map(|secs| Duration::seconds(*secs as i64))
                .unwrap_or_else(|| Duration::seconds(default_secs))
        };

        let configs = vec![
            ProviderConfig::new(
                ProviderId::Market,
                r"(?i)\b(price|current price|\d+[- ]?day|ma|moving average|stock summary|ticker|quote)\b",
                1,
                HashSet::new(),
                ttl(ProviderId::Market, 60),
            )?,
            ProviderConfig::new(
                ProviderId::News,
                r"(?i)\b(news|latest|update|headlines|recent|breaking)\b",
                2,
                HashSet::new(),
                ttl(ProviderId::News, 300),
            )?,
            ProviderConfig::new(
                ProviderId::Holdings,
                r"(?i)\b(portfolio|top holdings|sector allocation|my stocks|my holdings)\b",
                3,
                HashSet::new(),
                ttl(ProviderId::Holdings, 120),
            )?,
            ProviderConfig::new(
                ProviderId::Knowledge,
                r"(?i)\b(explain|define|describe|how does|tell me about|annual report|proxy statement)\b",
                4,
                HashSet::new(),
                ttl(ProviderId::Knowledge, 600),
            )?,
            ProviderConfig::new(
                ProviderId::Notify,
                r"(?i)\b(daily snapshot|send email|email report|notify|mail)\b",
                5,
                [ProviderId::Holdings].into_iter().collect(),
                ttl(ProviderId::Notify, 0),
            )?,
        ];

        Self::new(configs)
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.index.get(&id).map(|i| &self.configs[*i])
    }

    /// All configurations in registration order.
    pub fn all(&self) -> &[ProviderConfig] {
        &self.configs
    }

    // Depth-first cycle check over the dependency edges. The set is tiny, so
    // no need for anything cleverer than tri-color marking.
    fn check_acyclic(&self) -> Result<(), AppError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            registry: &ProviderRegistry,
            id: ProviderId,
            marks: &mut HashMap<ProviderId, Mark>,
        ) -> Result<(), AppError> {
            match marks.get(&id).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(AppError::ConfigError(format!(
                        "dependency cycle involving provider {id}"
                    )));
                }
                Mark::Unvisited => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(config) = registry.get(id) {
                for dep in &config.dependencies {
                    visit(registry, *dep, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for config in &self.configs {
            visit(self, config.id, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(id: ProviderId, deps: HashSet<ProviderId>) -> ProviderConfig {
        ProviderConfig::new(id, r"(?i)\bunused\b", 1, deps, Duration::seconds(0)).unwrap()
    }

    #[test]
    fn default_registry_is_valid() {
        let registry = ProviderRegistry::with_defaults(&Config::default()).unwrap();
        assert_eq!(registry.all().len(), 5);
        let notify = registry.get(ProviderId::Notify).unwrap();
        assert!(notify.dependencies.contains(&ProviderId::Holdings));
        assert_eq!(notify.cache_ttl, Duration::zero());
    }

    #[test]
    fn unregistered_dependency_is_fatal() {
        let configs = vec![plain(
            ProviderId::Notify,
            [ProviderId::Holdings].into_iter().collect(),
        )];
        let err = ProviderRegistry::new(configs).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn dependency_cycle_is_fatal() {
        let configs = vec![
            plain(ProviderId::Notify, [ProviderId::Holdings].into_iter().collect()),
            plain(ProviderId::Holdings, [ProviderId::Notify].into_iter().collect()),
        ];
        let err = ProviderRegistry::new(configs).unwrap_err();
        match err {
            AppError::ConfigError(msg) => assert!(msg.contains("cycle")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_registration_is_fatal() {
        let configs = vec![
            plain(ProviderId::Market, HashSet::new()),
            plain(ProviderId::Market, HashSet::new()),
        ];
        assert!(ProviderRegistry::new(configs).is_err());
    }

    #[test]
    fn ttl_overrides_apply() {
        let mut config = Config::default();
        config.provider_ttl_overrides.insert(ProviderId::Market, 5);
        let registry = ProviderRegistry::with_defaults(&config).unwrap();
        assert_eq!(
            registry.get(ProviderId::Market).unwrap().cache_ttl,
            Duration::seconds(5)
        );
    }
}
