use crate::config::ProcessorsConfig;
use crate::error::{FilerError, FilerResult};
use crate::models::FilingType;
use crate::processors::{all_processors, FilingProcessor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Filing type to processor lookup
///
/// Lookup is O(1). Processors are registered at construction and the
/// registry is immutable once shared.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<FilingType, Arc<dyn FilingProcessor>>,
    disabled: HashSet<FilingType>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.processors.keys().map(FilingType::as_str).collect();
        registered.sort_unstable();
        let mut disabled: Vec<_> = self.disabled.iter().map(FilingType::as_str).collect();
        disabled.sort_unstable();

        f.debug_struct("ProcessorRegistry")
            .field("processor_count", &self.processors.len())
            .field("registered", &registered)
            .field("disabled", &disabled)
            .finish()
    }
}

impl ProcessorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in processor enabled
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for processor in all_processors() {
            registry.register(processor);
        }
        info!(
            processor_count = registry.processors.len(),
            "✅ Registered filing processors"
        );
        registry
    }

    /// Built-in processors minus the ones disabled by configuration
    ///
    /// Disabled names must be known filing types.
    pub fn from_config(config: &ProcessorsConfig) -> FilerResult<Self> {
        let mut registry = Self::standard();
        for name in &config.disabled {
            let filing_type: FilingType = name.parse().map_err(|_| {
                FilerError::Configuration(format!("cannot disable unknown filing type {name}"))
            })?;
            registry.disable(filing_type);
        }
        Ok(registry)
    }

    /// Register a processor, replacing any existing one for its filing type
    pub fn register(&mut self, processor: Arc<dyn FilingProcessor>) {
        let filing_type = processor.filing_type();
        if self.processors.insert(filing_type, processor).is_some() {
            warn!(filing_type = %filing_type, "Replaced existing processor");
        }
    }

    /// Switch off the processor for `filing_type`
    pub fn disable(&mut self, filing_type: FilingType) {
        if self.disabled.insert(filing_type) {
            warn!(filing_type = %filing_type, "⚠️ Processor disabled by configuration");
        }
    }

    /// Resolve a raw filing type name
    pub fn resolve(&self, filing_type: &str) -> FilerResult<Arc<dyn FilingProcessor>> {
        let parsed: FilingType = filing_type.parse().map_err(|_| FilerError::UnknownFilingType {
            filing_type: filing_type.to_string(),
        })?;
        self.resolve_type(parsed)
    }

    pub fn resolve_type(&self, filing_type: FilingType) -> FilerResult<Arc<dyn FilingProcessor>> {
        if self.disabled.contains(&filing_type) {
            return Err(FilerError::ProcessorDisabled {
                filing_type: filing_type.to_string(),
            });
        }
        self.processors
            .get(&filing_type)
            .cloned()
            .ok_or_else(|| FilerError::UnknownFilingType {
                filing_type: filing_type.to_string(),
            })
    }

    pub fn is_disabled(&self, filing_type: FilingType) -> bool {
        self.disabled.contains(&filing_type)
    }

    /// Enabled filing types, sorted by name
    pub fn registered_types(&self) -> Vec<FilingType> {
        let mut types: Vec<_> = self
            .processors
            .keys()
            .filter(|t| !self.disabled.contains(t))
            .copied()
            .collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
