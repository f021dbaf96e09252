use crate::Error;
use crate::Result;
use crate::database::PoolConfig;
use std::path::Path;
use std::time::Duration;

pub const DATABASE_FILE: &str = "liarsdice.db";

/// engine tuning applied per connection at open
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub cache_size: i64,
    pub page_size: i64,
    pub journal_mode: String,
    pub synchronous: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cache_size: 10_000,
            page_size: 4096,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub enable_foreign_keys: bool,
    pub enable_triggers: bool,
    pub enable_full_text_search: bool,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            enable_foreign_keys: true,
            enable_triggers: true,
            enable_full_text_search: false,
        }
    }
}

/// the `database`-rooted init document (JSON or XML)
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub create_schema: bool,
    pub seed_data: bool,
    pub run_migrations: bool,
    pub validate_schema: bool,
    pub migration_directory: String,
    pub seed_data_file: String,
    pub performance: StorageSettings,
    pub features: FeatureSettings,
    pub required_tables: Vec<String>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            create_schema: true,
            seed_data: true,
            run_migrations: true,
            validate_schema: false,
            migration_directory: String::new(),
            seed_data_file: String::new(),
            performance: StorageSettings::default(),
            features: FeatureSettings::default(),
            required_tables: Vec::new(),
        }
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct InitDocument {
    #[serde(default)]
    database: InitConfig,
}

/// XML carries the list as repeated <table> children
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct XmlTables {
    table: Vec<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct XmlInitConfig {
    create_schema: Option<bool>,
    seed_data: Option<bool>,
    run_migrations: Option<bool>,
    validate_schema: Option<bool>,
    migration_directory: Option<String>,
    seed_data_file: Option<String>,
    performance: Option<StorageSettings>,
    features: Option<FeatureSettings>,
    required_tables: Option<XmlTables>,
}

impl From<XmlInitConfig> for InitConfig {
    fn from(xml: XmlInitConfig) -> Self {
        let defaults = InitConfig::default();
        Self {
            create_schema: xml.create_schema.unwrap_or(defaults.create_schema),
            seed_data: xml.seed_data.unwrap_or(defaults.seed_data),
            run_migrations: xml.run_migrations.unwrap_or(defaults.run_migrations),
            validate_schema: xml.validate_schema.unwrap_or(defaults.validate_schema),
            migration_directory: xml.migration_directory.unwrap_or_default(),
            seed_data_file: xml.seed_data_file.unwrap_or_default(),
            performance: xml.performance.unwrap_or_default(),
            features: xml.features.unwrap_or_default(),
            required_tables: xml.required_tables.map(|t| t.table).unwrap_or_default(),
        }
    }
}

impl InitConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::invalid_parameter(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: InitDocument = serde_json::from_str(text)
            .map_err(|e| Error::internal(format!("failed to parse JSON configuration: {}", e)))?;
        Ok(document.database)
    }

    pub fn from_xml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::invalid_parameter(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_xml(&text)
    }

    /// the whole document is the <database> element
    pub fn from_xml(text: &str) -> Result<Self> {
        let xml: XmlInitConfig = quick_xml::de::from_str(text)
            .map_err(|e| Error::internal(format!("failed to parse XML configuration: {}", e)))?;
        Ok(InitConfig::from(xml))
    }

    pub fn to_json(&self) -> Result<String> {
        let document = InitDocument {
            database: self.clone(),
        };
        serde_json::to_string_pretty(&document)
            .map_err(|e| Error::internal(format!("failed to render configuration: {}", e)))
    }
}

/// pool knobs as they appear on the wire; consumed, not produced
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub min_connections: usize,
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
    pub health_check_enabled: bool,
    pub health_check_interval_s: u64,
    pub idle_evict_after_s: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 8,
            acquire_timeout_ms: 5_000,
            health_check_enabled: true,
            health_check_interval_s: 30,
            idle_evict_after_s: 300,
        }
    }
}

impl From<PoolSettings> for PoolConfig {
    fn from(settings: PoolSettings) -> Self {
        Self {
            min_connections: settings.min_connections,
            max_connections: settings.max_connections,
            acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
            idle_evict_after: Duration::from_secs(settings.idle_evict_after_s),
            health_check_interval: Duration::from_secs(settings.health_check_interval_s),
            health_check_enabled: settings.health_check_enabled,
        }
    }
}

/// connection URI for the database file inside a data directory
pub fn database_uri(directory: impl AsRef<Path>) -> Result<String> {
    let absolute = std::path::absolute(directory.as_ref())?;
    Ok(format!(
        "file:{}?mode=rwc&cache=shared&psow=1&nolock=0",
        absolute.join(DATABASE_FILE).display()
    ))
}
